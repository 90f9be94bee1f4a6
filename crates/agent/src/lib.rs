//! Conversational layer of the weather assistant.
//!
//! A message flows through a fixed pipeline:
//! 1. **Reasoning** (`reasoning`, `intent`, `llm`) - classify the message into an intent and city
//! 2. **Routing** (`router`) - turn the classification into a routing decision for the session
//! 3. **Capability handlers** (`handlers`) - fetch weather data and render the answer text
//! 4. **Streaming** (`stream`) - emit partial output events and aggregate them into one reply
//!
//! The reasoning engine only classifies. Weather figures always come from the provider, never
//! from a model.

pub mod handlers;
pub mod intent;
pub mod llm;
pub mod reasoning;
pub mod router;
pub mod runtime;
pub mod stream;

pub use handlers::{CapabilityHandler, CurrentWeatherHandler, ForecastHandler, HandlerRegistry};
pub use intent::KeywordReasoner;
pub use llm::{LlmClient, LlmReasoner, OpenAiCompatibleClient};
pub use reasoning::{Classification, Intent, ReasoningEngine, ReasoningError};
pub use router::Router;
pub use runtime::{AgentRuntime, GREETING};
pub use stream::{EventStream, PartialOutputEvent, ResponseAggregator};
