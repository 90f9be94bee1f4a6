use std::sync::Arc;

use async_stream::stream;
use stratus_core::{RoutingDecision, Session, TemperatureUnit};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::handlers::HandlerRegistry;
use crate::reasoning::ReasoningEngine;
use crate::router::Router;
use crate::stream::{EventStream, PartialOutputEvent};

pub const GREETING: &str = "Hello! I'm the Multi-Agent Weather Bot. I can tell you the current \
weather or give you a 3-day forecast for any city. What would you like to know?";

const NO_HANDLER_REPLY: &str =
    "Sorry, I can't help with that right now. Please try again later.";

/// Routes a message and produces the event stream that answers it.
pub struct AgentRuntime {
    router: Router,
    handlers: HandlerRegistry,
}

impl AgentRuntime {
    pub fn new(engine: Arc<dyn ReasoningEngine>, handlers: HandlerRegistry) -> Self {
        let router = Router::new(engine, handlers.capabilities());
        Self { router, handlers }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Routing happens before this returns; the stream only runs the chosen handler.
    pub async fn respond(
        &self,
        message: &str,
        session: &Session,
        unit: TemperatureUnit,
        cancel: &CancellationToken,
    ) -> (RoutingDecision, EventStream) {
        let decision = self.router.route(message, session, cancel).await;
        let events = self.events_for(&decision, session, unit, cancel.clone());
        (decision, events)
    }

    fn events_for(
        &self,
        decision: &RoutingDecision,
        session: &Session,
        unit: TemperatureUnit,
        cancel: CancellationToken,
    ) -> EventStream {
        match decision.clone() {
            RoutingDecision::Greet => {
                Box::pin(futures::stream::iter([PartialOutputEvent::Text(GREETING.to_string())]))
            }
            RoutingDecision::Clarify { prompt } => {
                Box::pin(futures::stream::iter([PartialOutputEvent::Text(prompt)]))
            }
            RoutingDecision::Delegate { capability, city } => {
                let handler = self.handlers.get(capability);
                let session_id = session.id.clone();
                Box::pin(stream! {
                    info!(
                        event_name = "agent.runtime.delegated",
                        session_id = %session_id,
                        capability = %capability,
                        city = %city,
                        unit = %unit,
                        "delegating to capability handler"
                    );
                    yield PartialOutputEvent::Delegation { capability, city: city.clone() };

                    match handler {
                        Some(handler) => {
                            let reply = handler.handle(&city, unit, &cancel).await;
                            yield PartialOutputEvent::Text(reply);
                        }
                        None => {
                            yield PartialOutputEvent::Notice(format!("no handler registered for {capability}"));
                            yield PartialOutputEvent::Text(NO_HANDLER_REPLY.to_string());
                        }
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use futures::StreamExt;
    use stratus_core::{Capability, RoutingDecision, Session, SessionId, TemperatureUnit};
    use stratus_weather::{CurrentConditions, DailyForecast, ProviderError, WeatherProvider};
    use tokio_util::sync::CancellationToken;

    use super::{AgentRuntime, GREETING};
    use crate::handlers::HandlerRegistry;
    use crate::intent::KeywordReasoner;
    use crate::stream::{PartialOutputEvent, ResponseAggregator};

    struct SunnyProvider;

    #[async_trait]
    impl WeatherProvider for SunnyProvider {
        async fn current_conditions(
            &self,
            city: &str,
            _unit: TemperatureUnit,
            _cancel: &CancellationToken,
        ) -> Result<CurrentConditions, ProviderError> {
            Ok(CurrentConditions {
                city: city.to_string(),
                description: "sunny".to_string(),
                temperature: 21.0,
                feels_like: 20.5,
                humidity: 40,
            })
        }

        async fn forecast_summary(
            &self,
            _city: &str,
            _unit: TemperatureUnit,
            _cancel: &CancellationToken,
        ) -> Result<Vec<DailyForecast>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn runtime() -> AgentRuntime {
        AgentRuntime::new(Arc::new(KeywordReasoner::new()), HandlerRegistry::weather(Arc::new(SunnyProvider)))
    }

    #[tokio::test]
    async fn delegation_emits_marker_then_text() {
        let runtime = runtime();
        let session = Session::new(SessionId("s".to_string()), 20);

        let (decision, events) = runtime
            .respond("weather in Madrid", &session, TemperatureUnit::Celsius, &CancellationToken::new())
            .await;
        let events: Vec<PartialOutputEvent> = events.collect().await;

        assert_eq!(decision.capability(), Some(Capability::CurrentWeather));
        assert_eq!(
            events[0],
            PartialOutputEvent::Delegation {
                capability: Capability::CurrentWeather,
                city: "Madrid".to_string()
            }
        );
        assert!(events[1].text().is_some_and(|text| text.contains("Madrid") && text.contains("20.5°C")));
    }

    #[tokio::test]
    async fn greeting_introduces_the_bot() {
        let runtime = runtime();
        let session = Session::new(SessionId("s".to_string()), 20);

        let (decision, events) = runtime
            .respond("hi", &session, TemperatureUnit::Celsius, &CancellationToken::new())
            .await;

        assert_eq!(decision, RoutingDecision::Greet);
        assert_eq!(ResponseAggregator::collect(events).await, GREETING);
    }

    #[tokio::test]
    async fn no_registered_capabilities_asks_for_clarification() {
        let runtime = AgentRuntime::new(Arc::new(KeywordReasoner::new()), HandlerRegistry::default());
        let session = Session::new(SessionId("s".to_string()), 20);

        let (decision, events) = runtime
            .respond("weather in Rome", &session, TemperatureUnit::Celsius, &CancellationToken::new())
            .await;

        // Without registered capabilities the keyword engine cannot pick one.
        assert!(matches!(decision, RoutingDecision::Clarify { .. }));
        assert!(!ResponseAggregator::collect(events).await.is_empty());
    }
}
