use serde::{Deserialize, Serialize};

use crate::domain::capability::Capability;
use crate::domain::session::Turn;

/// What a reasoning engine knows about the conversation before the new message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConversationContext<'a> {
    pub history: &'a [Turn],
    /// Capability and city of the most recent delegated turn.
    pub last_capability: Option<Capability>,
    pub last_city: Option<&'a str>,
}

/// Outcome of routing one inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingDecision {
    Delegate { capability: Capability, city: String },
    Clarify { prompt: String },
    Greet,
}

impl RoutingDecision {
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Self::Delegate { capability, .. } => Some(*capability),
            Self::Clarify { .. } | Self::Greet => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Delegate { .. } => "delegate",
            Self::Clarify { .. } => "clarify",
            Self::Greet => "greet",
        }
    }
}
