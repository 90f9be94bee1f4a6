use std::time::Duration;

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("rate limit exceeded for client `{client}`: {limit} requests per {window:?}")]
pub struct RateLimitExceeded {
    pub client: String,
    pub limit: u32,
    pub window: Duration,
}

/// Request-level failures surfaced to the caller with a non-success status.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
    #[error("missing or invalid api key")]
    Unauthorized,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "Rate limit exceeded",
            Self::Unauthorized => "Invalid API key",
            Self::InvalidRequest(_) => {
                "The request could not be processed. Check inputs and try again."
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}
