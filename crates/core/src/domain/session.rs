use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::capability::Capability;
use crate::domain::routing::ConversationContext;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Uses the client supplied id when it is non-blank, otherwise mints a fresh one.
    pub fn from_request(value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => Self(value.to_string()),
            None => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub reply: String,
    pub capability: Option<Capability>,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub last_capability: Option<Capability>,
    pub last_city: Option<String>,
    pub created_at: DateTime<Utc>,
    history: Vec<Turn>,
    max_history: usize,
}

impl Session {
    pub fn new(id: SessionId, max_history: usize) -> Self {
        Self {
            id,
            last_capability: None,
            last_city: None,
            created_at: Utc::now(),
            history: Vec::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn context(&self) -> ConversationContext<'_> {
        ConversationContext {
            history: &self.history,
            last_capability: self.last_capability,
            last_city: self.last_city.as_deref(),
        }
    }

    pub fn remember_delegation(&mut self, capability: Capability, city: &str) {
        self.last_capability = Some(capability);
        self.last_city = Some(city.to_string());
    }

    /// Appends a completed turn, dropping the oldest ones beyond the history cap.
    pub fn record_turn(&mut self, turn: Turn) {
        self.history.push(turn);
        if self.history.len() > self.max_history {
            let overflow = self.history.len() - self.max_history;
            self.history.drain(..overflow);
        }
    }

    pub fn turn_count(&self) -> usize {
        self.history.len()
    }
}
