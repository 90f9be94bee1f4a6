use stratus_core::retry::{RetryError, Retryable};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProviderError {
    #[error("city name is empty or invalid")]
    InvalidCity,
    #[error("network failure talking to weather provider: {0}")]
    Network(String),
    #[error("weather provider request timed out")]
    Timeout,
    #[error("weather provider returned status {status}")]
    Status { status: u16 },
    #[error("weather provider does not know city `{city}`")]
    UnknownCity { city: String },
    #[error("malformed weather provider payload: {0}")]
    Malformed(String),
    #[error("weather provider request cancelled")]
    Cancelled,
    #[error("weather provider unavailable after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ProviderError> },
}

impl ProviderError {
    /// The provider could not be reached or did not answer successfully.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::Status { .. } | Self::Cancelled => true,
            Self::RetriesExhausted { last, .. } => last.is_transport(),
            Self::InvalidCity | Self::UnknownCity { .. } | Self::Malformed(_) => false,
        }
    }

    /// The provider answered but the request or its payload was unusable.
    pub fn is_data(&self) -> bool {
        match self {
            Self::InvalidCity | Self::UnknownCity { .. } | Self::Malformed(_) => true,
            Self::RetriesExhausted { last, .. } => last.is_data(),
            Self::Network(_) | Self::Timeout | Self::Status { .. } | Self::Cancelled => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCity => "invalid_city",
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::Status { .. } => "status",
            Self::UnknownCity { .. } => "unknown_city",
            Self::Malformed(_) => "malformed",
            Self::Cancelled => "cancelled",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout | Self::Status { .. } | Self::Malformed(_))
    }
}

impl From<RetryError<ProviderError>> for ProviderError {
    fn from(value: RetryError<ProviderError>) -> Self {
        match value {
            RetryError::Permanent(error) => error,
            RetryError::Exhausted { attempts, last } => {
                Self::RetriesExhausted { attempts, last: Box::new(last) }
            }
            RetryError::Cancelled { .. } => Self::Cancelled,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        if error.is_decode() {
            return Self::Malformed(error.without_url().to_string());
        }
        // The request url carries the api key as a query parameter.
        Self::Network(error.without_url().to_string())
    }
}
