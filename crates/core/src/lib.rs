pub mod config;
pub mod domain;
pub mod errors;
pub mod rate_limit;
pub mod retry;
pub mod sessions;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::capability::{Capability, TemperatureUnit};
pub use domain::chat::{ChatReply, ChatRequest};
pub use domain::routing::{ConversationContext, RoutingDecision};
pub use domain::session::{Session, SessionId, Turn};
pub use errors::{GatewayError, RateLimitExceeded};
pub use rate_limit::{Admission, RateLimiter};
pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
pub use sessions::SessionRegistry;
