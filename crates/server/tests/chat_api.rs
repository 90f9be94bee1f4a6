use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::{json, Value};
use stratus_agent::{
    AgentRuntime, Classification, HandlerRegistry, Intent, KeywordReasoner, ReasoningEngine,
    ReasoningError,
};
use stratus_core::{Capability, ConversationContext, RateLimiter, SessionRegistry, TemperatureUnit};
use stratus_server::{router, ApiKeyPolicy, ApiState, Gateway};
use stratus_weather::{CurrentConditions, DailyForecast, ProviderError, WeatherProvider};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct CountingEngine {
    inner: KeywordReasoner,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ReasoningEngine for CountingEngine {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn classify(
        &self,
        context: ConversationContext<'_>,
        message: &str,
        capabilities: &[Capability],
    ) -> Result<Classification, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.classify(context, message, capabilities).await
    }
}

struct StubProvider;

#[async_trait]
impl WeatherProvider for StubProvider {
    async fn current_conditions(
        &self,
        city: &str,
        _unit: TemperatureUnit,
        _cancel: &CancellationToken,
    ) -> Result<CurrentConditions, ProviderError> {
        Ok(CurrentConditions {
            city: city.to_string(),
            description: "clear sky".to_string(),
            temperature: 15.0,
            feels_like: 14.0,
            humidity: 60,
        })
    }

    async fn forecast_summary(
        &self,
        _city: &str,
        _unit: TemperatureUnit,
        _cancel: &CancellationToken,
    ) -> Result<Vec<DailyForecast>, ProviderError> {
        Ok(vec![DailyForecast {
            date: "2024-05-01".to_string(),
            dominant_condition: "light rain".to_string(),
            average_temperature: 12.5,
        }])
    }
}

struct SlowProvider;

#[async_trait]
impl WeatherProvider for SlowProvider {
    async fn current_conditions(
        &self,
        _city: &str,
        _unit: TemperatureUnit,
        cancel: &CancellationToken,
    ) -> Result<CurrentConditions, ProviderError> {
        cancel.cancelled().await;
        Err(ProviderError::Cancelled)
    }

    async fn forecast_summary(
        &self,
        _city: &str,
        _unit: TemperatureUnit,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyForecast>, ProviderError> {
        cancel.cancelled().await;
        Err(ProviderError::Cancelled)
    }
}

/// Answers after a fixed delay and never looks at the cancellation token.
struct StalledProvider {
    latency: Duration,
}

#[async_trait]
impl WeatherProvider for StalledProvider {
    async fn current_conditions(
        &self,
        city: &str,
        unit: TemperatureUnit,
        cancel: &CancellationToken,
    ) -> Result<CurrentConditions, ProviderError> {
        tokio::time::sleep(self.latency).await;
        StubProvider.current_conditions(city, unit, cancel).await
    }

    async fn forecast_summary(
        &self,
        city: &str,
        unit: TemperatureUnit,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyForecast>, ProviderError> {
        tokio::time::sleep(self.latency).await;
        StubProvider.forecast_summary(city, unit, cancel).await
    }
}

struct Harness {
    app: Router,
    calls: Arc<AtomicUsize>,
}

fn harness_with(provider: Arc<dyn WeatherProvider>, api_keys: ApiKeyPolicy) -> Harness {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = CountingEngine { inner: KeywordReasoner::new(), calls: Arc::clone(&calls) };
    let gateway = Gateway::new(
        RateLimiter::new(20, Duration::from_secs(60)),
        SessionRegistry::new(20, None),
        AgentRuntime::new(Arc::new(engine), HandlerRegistry::weather(provider)),
        api_keys,
    );
    let state =
        ApiState { gateway: Arc::new(gateway), request_timeout: Duration::from_secs(30) };

    Harness { app: router(state, true), calls }
}

fn harness() -> Harness {
    harness_with(Arc::new(StubProvider), ApiKeyPolicy::disabled())
}

fn chat_request(body: Value, client: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .expect("build request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router should respond");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

#[tokio::test]
async fn current_weather_reply_carries_provider_readings() {
    let harness = harness();

    let (status, body) = send(
        &harness.app,
        chat_request(json!({ "message": "What's the weather in London?" }), "198.51.100.1"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let reply = body["reply"].as_str().expect("reply text");
    assert!(reply.contains("London"), "reply was: {reply}");
    assert!(reply.contains("15"), "reply was: {reply}");
    assert!(reply.contains("60%"), "reply was: {reply}");
    assert!(!body["session_id"].as_str().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn twenty_first_request_is_rejected_before_routing() {
    let harness = harness();

    for _ in 0..20 {
        let (status, _) =
            send(&harness.app, chat_request(json!({ "message": "hello" }), "203.0.113.9")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) =
        send(&harness.app, chat_request(json!({ "message": "hello" }), "203.0.113.9")).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({ "detail": "Rate limit exceeded" }));
    assert_eq!(harness.calls.load(Ordering::SeqCst), 20);

    // Other clients keep their own budget.
    let (status, _) =
        send(&harness.app, chat_request(json!({ "message": "hello" }), "203.0.113.10")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_or_wrong_api_key_is_unauthorized() {
    let harness = harness_with(
        Arc::new(StubProvider),
        ApiKeyPolicy::required(SecretString::from("gateway-key".to_string())),
    );

    let (status, body) =
        send(&harness.app, chat_request(json!({ "message": "hello" }), "198.51.100.2")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "detail": "Invalid API key" }));

    let mut request = chat_request(json!({ "message": "hello" }), "198.51.100.2");
    request.headers_mut().insert("x-api-key", "gateway-key".parse().expect("header value"));
    let (status, _) = send(&harness.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn session_id_is_generated_then_echoed() {
    let harness = harness();

    let (_, first) = send(
        &harness.app,
        chat_request(json!({ "message": "Will it rain tomorrow?" }), "198.51.100.3"),
    )
    .await;
    let session_id = first["session_id"].as_str().expect("generated session id").to_string();
    assert!(first["reply"].as_str().unwrap_or_default().contains("forecast"));

    let (status, second) = send(
        &harness.app,
        chat_request(json!({ "message": "Paris", "sessionId": session_id }), "198.51.100.3"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["session_id"].as_str(), Some(session_id.as_str()));
    let reply = second["reply"].as_str().expect("reply text");
    assert!(reply.contains("forecast for Paris"), "reply was: {reply}");
    assert!(reply.contains("light rain"), "reply was: {reply}");
}

#[tokio::test]
async fn follow_up_without_city_uses_last_city_of_session() {
    let harness = harness();
    let client = "198.51.100.9";

    for message in ["Will it rain tomorrow?", "Paris"] {
        let (status, _) = send(
            &harness.app,
            chat_request(json!({ "message": message, "session_id": "trip" }), client),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &harness.app,
        chat_request(json!({ "message": "and the current weather?", "session_id": "trip" }), client),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let reply = body["reply"].as_str().expect("reply text");
    assert!(reply.starts_with("Current weather in Paris"), "reply was: {reply}");
}

#[tokio::test]
async fn empty_message_is_unprocessable() {
    let harness = harness();

    let (status, body) =
        send(&harness.app, chat_request(json!({ "message": "   " }), "198.51.100.4")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().is_some());
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_body_is_unprocessable() {
    let harness = harness();

    let (status, body) =
        send(&harness.app, chat_request(json!({ "text": "hello" }), "198.51.100.5")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().is_some_and(|detail| detail.contains("message")));
}

#[tokio::test]
async fn deadline_cancels_slow_provider_with_apology() {
    let harness = harness_with(Arc::new(SlowProvider), ApiKeyPolicy::disabled());

    let mut request =
        chat_request(json!({ "message": "weather in Oslo" }), "198.51.100.6");
    request.headers_mut().insert("x-request-timeout-ms", "50".parse().expect("header value"));
    let (status, body) = send(&harness.app, request).await;

    assert_eq!(status, StatusCode::OK);
    let reply = body["reply"].as_str().expect("reply text");
    assert!(reply.contains("took too long"), "reply was: {reply}");
}

#[tokio::test]
async fn second_turn_on_busy_session_keeps_its_own_deadline() {
    let harness = harness_with(
        Arc::new(StalledProvider { latency: Duration::from_secs(1) }),
        ApiKeyPolicy::disabled(),
    );

    let first = {
        let app = harness.app.clone();
        tokio::spawn(async move {
            let request = chat_request(
                json!({ "message": "weather in Oslo", "session_id": "shared" }),
                "198.51.100.7",
            );
            send(&app, request).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut request = chat_request(
        json!({ "message": "weather in Oslo", "session_id": "shared" }),
        "198.51.100.8",
    );
    request.headers_mut().insert("x-request-timeout-ms", "100".parse().expect("header value"));
    let started = Instant::now();
    let (status, body) = send(&harness.app, request).await;
    let elapsed = started.elapsed();

    assert_eq!(status, StatusCode::OK);
    let reply = body["reply"].as_str().expect("reply text");
    assert!(reply.contains("took too long"), "reply was: {reply}");
    assert!(elapsed < Duration::from_millis(700), "second turn waited {elapsed:?}");

    let (status, body) = first.await.expect("first request task panicked");
    assert_eq!(status, StatusCode::OK);
    let reply = body["reply"].as_str().expect("reply text");
    assert!(reply.starts_with("Current weather in Oslo"), "reply was: {reply}");
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let harness = harness();
    let request = Request::builder().uri("/").body(Body::empty()).expect("build request");

    let (status, body) = send(&harness.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}
