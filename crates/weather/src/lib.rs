pub mod client;
pub mod error;
pub mod forecast;
pub mod model;

pub use client::{validate_city, WeatherClient, WeatherProvider};
pub use error::ProviderError;
pub use model::{CurrentConditions, DailyForecast};
