use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use stratus_core::Capability;

/// One incremental piece of an agent's answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartialOutputEvent {
    Text(String),
    Delegation { capability: Capability, city: String },
    Notice(String),
}

impl PartialOutputEvent {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Delegation { .. } | Self::Notice(_) => None,
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = PartialOutputEvent> + Send>>;

pub struct ResponseAggregator;

impl ResponseAggregator {
    /// Concatenates the text-bearing events in emission order.
    pub async fn collect<S>(stream: S) -> String
    where
        S: Stream<Item = PartialOutputEvent>,
    {
        futures::pin_mut!(stream);
        let mut reply = String::new();
        while let Some(event) = stream.next().await {
            if let PartialOutputEvent::Text(text) = event {
                reply.push_str(&text);
            }
        }
        reply
    }
}
