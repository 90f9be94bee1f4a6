pub mod capability;
pub mod chat;
pub mod routing;
pub mod session;
