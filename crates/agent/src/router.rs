use std::sync::Arc;

use stratus_core::{Capability, RoutingDecision, Session};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::reasoning::{Classification, Intent, ReasoningEngine, ReasoningError};

pub const GENERAL_CLARIFICATION: &str = "I can tell you the current weather or give you a 3-day \
forecast. Which city are you interested in, and would you like the current conditions or the \
forecast?";

pub struct Router {
    engine: Arc<dyn ReasoningEngine>,
    capabilities: Vec<Capability>,
}

impl Router {
    pub fn new(engine: Arc<dyn ReasoningEngine>, capabilities: Vec<Capability>) -> Self {
        Self { engine, capabilities }
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Classifies `message` once against the session's context and turns the answer into a
    /// routing decision. Engine failures and cancellation are treated as ambiguity.
    pub async fn route(
        &self,
        message: &str,
        session: &Session,
        cancel: &CancellationToken,
    ) -> RoutingDecision {
        let classified = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReasoningError::Cancelled),
            result = self.engine.classify(session.context(), message, &self.capabilities) => result,
        };

        let classification = match classified {
            Ok(classification) => classification,
            Err(error) => {
                warn!(
                    event_name = "agent.router.reasoning_failed",
                    session_id = %session.id,
                    engine = self.engine.name(),
                    error = %error,
                    "reasoning engine failed, asking for clarification"
                );
                Classification::unclear()
            }
        };

        info!(
            event_name = "agent.router.classified",
            session_id = %session.id,
            engine = self.engine.name(),
            intent = classification.intent.as_str(),
            city = classification.city.as_deref().unwrap_or(""),
            "message classified"
        );

        self.decide(classification)
    }

    fn decide(&self, classification: Classification) -> RoutingDecision {
        let capability = match classification.intent {
            Intent::Greet => return RoutingDecision::Greet,
            Intent::Unclear => return clarify(GENERAL_CLARIFICATION),
            Intent::CurrentWeather | Intent::Forecast => classification.intent.capability(),
        };

        let Some(capability) = capability.filter(|capability| self.capabilities.contains(capability))
        else {
            return clarify(GENERAL_CLARIFICATION);
        };

        match classification.city {
            Some(city) => RoutingDecision::Delegate { capability, city },
            None => clarify(&missing_city_prompt(capability)),
        }
    }
}

fn clarify(prompt: &str) -> RoutingDecision {
    RoutingDecision::Clarify { prompt: prompt.to_string() }
}

fn missing_city_prompt(capability: Capability) -> String {
    match capability {
        Capability::CurrentWeather => {
            "Which city would you like the current weather for?".to_string()
        }
        Capability::Forecast => "Which city would you like the forecast for?".to_string(),
    }
}
