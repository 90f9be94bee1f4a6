use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratus_core::{Capability, ConversationContext};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greet,
    CurrentWeather,
    Forecast,
    Unclear,
}

impl Intent {
    pub fn capability(self) -> Option<Capability> {
        match self {
            Self::CurrentWeather => Some(Capability::CurrentWeather),
            Self::Forecast => Some(Capability::Forecast),
            Self::Greet | Self::Unclear => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greet => "greet",
            Self::CurrentWeather => "current_weather",
            Self::Forecast => "forecast",
            Self::Unclear => "unclear",
        }
    }
}

impl From<Capability> for Intent {
    fn from(capability: Capability) -> Self {
        match capability {
            Capability::CurrentWeather => Self::CurrentWeather,
            Capability::Forecast => Self::Forecast,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub city: Option<String>,
}

impl Classification {
    pub fn new(intent: Intent, city: Option<String>) -> Self {
        Self { intent, city }
    }

    pub fn unclear() -> Self {
        Self { intent: Intent::Unclear, city: None }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReasoningError {
    #[error("reasoning engine request failed: {0}")]
    Request(String),
    #[error("reasoning engine timed out")]
    Timeout,
    #[error("reasoning engine returned an unusable answer: {0}")]
    InvalidResponse(String),
    #[error("reasoning engine call cancelled")]
    Cancelled,
}

/// Decides what a message asks for. Implementations may be local heuristics or remote models.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(
        &self,
        context: ConversationContext<'_>,
        message: &str,
        capabilities: &[Capability],
    ) -> Result<Classification, ReasoningError>;
}
