use std::sync::Arc;
use std::time::Instant;

use secrecy::{ExposeSecret, SecretString};
use stratus_agent::{AgentRuntime, HandlerRegistry, ReasoningEngine, ResponseAggregator};
use stratus_core::config::{AppConfig, AuthConfig};
use stratus_core::{
    ChatReply, ChatRequest, GatewayError, RateLimiter, RoutingDecision, SessionId,
    SessionRegistry, TemperatureUnit, Turn,
};
use stratus_weather::WeatherProvider;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MAX_MESSAGE_CHARS: usize = 2_000;

/// Shared-key check applied before a request is admitted.
#[derive(Clone, Debug)]
pub struct ApiKeyPolicy {
    required: bool,
    key: Option<SecretString>,
}

impl ApiKeyPolicy {
    pub fn disabled() -> Self {
        Self { required: false, key: None }
    }

    pub fn required(key: SecretString) -> Self {
        Self { required: true, key: Some(key) }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self { required: config.require_api_key, key: config.api_key.clone() }
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn check(&self, presented: Option<&str>) -> Result<(), GatewayError> {
        if !self.required {
            return Ok(());
        }

        let expected = self.key.as_ref().map(|key| key.expose_secret());
        match (expected, presented) {
            (Some(expected), Some(presented))
                if constant_time_eq(expected.as_bytes(), presented.as_bytes()) =>
            {
                Ok(())
            }
            _ => Err(GatewayError::Unauthorized),
        }
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0_u8, |acc, (l, r)| acc | (l ^ r)) == 0
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rate_windows: usize,
    pub sessions: usize,
}

/// Orchestrates one chat turn: admission, session resolution, routing and aggregation.
pub struct Gateway {
    limiter: RateLimiter,
    sessions: SessionRegistry,
    runtime: AgentRuntime,
    api_keys: ApiKeyPolicy,
}

impl Gateway {
    pub fn new(
        limiter: RateLimiter,
        sessions: SessionRegistry,
        runtime: AgentRuntime,
        api_keys: ApiKeyPolicy,
    ) -> Self {
        Self { limiter, sessions, runtime, api_keys }
    }

    pub fn from_config(
        config: &AppConfig,
        engine: Arc<dyn ReasoningEngine>,
        provider: Arc<dyn WeatherProvider>,
    ) -> Self {
        Self::new(
            RateLimiter::from_config(&config.rate_limit),
            SessionRegistry::from_config(&config.session),
            AgentRuntime::new(engine, HandlerRegistry::weather(provider)),
            ApiKeyPolicy::from_config(&config.auth),
        )
    }

    pub fn authorize(&self, presented: Option<&str>) -> Result<(), GatewayError> {
        self.api_keys.check(presented).map_err(|error| {
            warn!(event_name = "gateway.auth.rejected", "request rejected: invalid api key");
            error
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn handle(
        &self,
        request: ChatRequest,
        client: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, GatewayError> {
        let admission = self.limiter.admit(client)?;

        let message = request.message.trim();
        if message.is_empty() {
            return Err(GatewayError::InvalidRequest("message must not be empty".to_string()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(GatewayError::InvalidRequest(format!(
                "message must be at most {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let unit = resolve_unit(request.unit.as_deref());
        let session_id = SessionId::from_request(request.session_id.as_deref());
        let started = Instant::now();
        info!(
            event_name = "gateway.request.admitted",
            client_id = %client,
            session_id = %session_id,
            remaining = admission.remaining,
            "chat request admitted"
        );

        // Routing and delegation work on a copy; the stored session is only locked to write back.
        let session = self.sessions.snapshot(&session_id);
        let (decision, events) = self.runtime.respond(message, &session, unit, cancel).await;
        let reply = ResponseAggregator::collect(events).await;

        let turn =
            Turn { user: message.to_string(), reply: reply.clone(), capability: decision.capability() };
        self.sessions.update(&session_id, |session| {
            if let RoutingDecision::Delegate { capability, city } = &decision {
                session.remember_delegation(*capability, city);
            }
            session.record_turn(turn);
        });

        info!(
            event_name = "gateway.request.completed",
            client_id = %client,
            session_id = %session_id,
            decision = decision.label(),
            cancelled = cancel.is_cancelled(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chat request completed"
        );

        Ok(ChatReply { reply, session_id: session_id.0 })
    }

    pub fn sweep_idle(&self, now: Instant) -> SweepReport {
        SweepReport {
            rate_windows: self.limiter.sweep_idle(now),
            sessions: self.sessions.sweep_idle(now),
        }
    }
}

fn resolve_unit(requested: Option<&str>) -> TemperatureUnit {
    let Some(requested) = requested else {
        return TemperatureUnit::default();
    };
    TemperatureUnit::parse(requested).unwrap_or_else(|| {
        warn!(
            event_name = "gateway.request.unknown_unit",
            unit = %requested,
            "unknown temperature unit, using Celsius"
        );
        TemperatureUnit::Celsius
    })
}
