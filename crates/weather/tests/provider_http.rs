use std::time::Duration;

use serde_json::{json, Value};
use stratus_core::retry::{RetryExecutor, RetryPolicy};
use stratus_core::TemperatureUnit;
use stratus_weather::{ProviderError, WeatherClient, WeatherProvider};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> WeatherClient {
    WeatherClient::new(
        server.uri(),
        "test-key".to_string().into(),
        Duration::from_secs(5),
        RetryExecutor::new(RetryPolicy { max_attempts: 3, delay: Duration::from_millis(10) }),
    )
    .expect("build weather client")
}

fn london_current() -> Value {
    json!({
        "name": "London",
        "weather": [{ "id": 800, "main": "Clear", "description": "clear sky" }],
        "main": { "temp": 15.0, "feels_like": 14.0, "humidity": 60 }
    })
}

fn forecast_body() -> Value {
    let sample = |dt_txt: &str, temp: f64, description: &str| {
        json!({
            "dt_txt": dt_txt,
            "main": { "temp": temp },
            "weather": [{ "description": description }]
        })
    };
    json!({
        "list": [
            sample("2026-02-06 09:00:00", 6.0, "light rain"),
            sample("2026-02-06 12:00:00", 8.6, "light rain"),
            sample("2026-02-07 09:00:00", 3.0, "clear sky"),
            sample("2026-02-08 09:00:00", 1.0, "snow"),
            sample("2026-02-09 09:00:00", 0.0, "snow")
        ]
    })
}

async fn received_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|requests| requests.len()).unwrap_or(0)
}

#[tokio::test]
async fn current_conditions_are_parsed_from_provider_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "London"))
        .and(query_param("appid", "test-key"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london_current()))
        .mount(&server)
        .await;

    let conditions = client_for(&server)
        .current_conditions("London", TemperatureUnit::Celsius, &CancellationToken::new())
        .await
        .expect("current conditions");

    assert_eq!(conditions.city, "London");
    assert_eq!(conditions.description, "clear sky");
    assert_eq!(conditions.temperature, 15.0);
    assert_eq!(conditions.feels_like, 14.0);
    assert_eq!(conditions.humidity, 60);
}

#[tokio::test]
async fn fahrenheit_requests_use_imperial_units() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("units", "imperial"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london_current()))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .current_conditions("London", TemperatureUnit::Fahrenheit, &CancellationToken::new())
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn unknown_city_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"cod": "404", "message": "city not found"})),
        )
        .mount(&server)
        .await;

    let error = client_for(&server)
        .current_conditions("Atlantis", TemperatureUnit::Celsius, &CancellationToken::new())
        .await
        .expect_err("unknown city should fail");

    assert_eq!(error, ProviderError::UnknownCity { city: "Atlantis".to_string() });
    assert_eq!(received_count(&server).await, 1);
}

#[tokio::test]
async fn transient_server_error_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london_current()))
        .mount(&server)
        .await;

    let conditions = client_for(&server)
        .current_conditions("London", TemperatureUnit::Celsius, &CancellationToken::new())
        .await
        .expect("third attempt should succeed");

    assert_eq!(conditions.description, "clear sky");
    assert_eq!(received_count(&server).await, 3);
}

#[tokio::test]
async fn persistent_failure_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .forecast_summary("Paris", TemperatureUnit::Celsius, &CancellationToken::new())
        .await
        .expect_err("provider keeps failing");

    assert!(matches!(
        error,
        ProviderError::RetriesExhausted { attempts: 3, ref last }
            if **last == ProviderError::Status { status: 500 }
    ));
    assert_eq!(received_count(&server).await, 3);
}

#[tokio::test]
async fn malformed_payload_is_reported_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .current_conditions("London", TemperatureUnit::Celsius, &CancellationToken::new())
        .await
        .expect_err("payload is missing fields");

    assert!(error.is_data());
    assert_eq!(error.kind(), "retries_exhausted");
}

#[tokio::test]
async fn payload_without_condition_is_retried_as_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "weather": [],
            "main": { "temp": 15.0, "feels_like": 14.0, "humidity": 60 }
        })))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .current_conditions("London", TemperatureUnit::Celsius, &CancellationToken::new())
        .await
        .expect_err("no condition label");

    assert!(matches!(
        error,
        ProviderError::RetriesExhausted { attempts: 3, ref last }
            if matches!(**last, ProviderError::Malformed(_))
    ));
    assert_eq!(received_count(&server).await, 3);
}

#[tokio::test]
async fn unshapeable_forecast_recovers_on_next_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "list": [{
                "dt_txt": "soon",
                "main": { "temp": 4.0 },
                "weather": [{ "description": "fog" }]
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(&server)
        .await;

    let days = client_for(&server)
        .forecast_summary("Paris", TemperatureUnit::Celsius, &CancellationToken::new())
        .await
        .expect("second attempt should succeed");

    assert_eq!(days.len(), 3);
    assert_eq!(received_count(&server).await, 2);
}

#[tokio::test]
async fn forecast_is_summarized_to_three_days() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .and(query_param("q", "Paris"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(&server)
        .await;

    let days = client_for(&server)
        .forecast_summary("Paris", TemperatureUnit::Celsius, &CancellationToken::new())
        .await
        .expect("forecast summary");

    assert_eq!(days.len(), 3);
    assert_eq!(days[0].date, "2026-02-06");
    assert_eq!(days[0].dominant_condition, "light rain");
    assert!((days[0].average_temperature - 7.3).abs() < 1e-9);
    assert_eq!(days[2].date, "2026-02-08");
}

#[tokio::test]
async fn invalid_city_never_reaches_provider() {
    let server = MockServer::start().await;

    let error = client_for(&server)
        .current_conditions("   ", TemperatureUnit::Celsius, &CancellationToken::new())
        .await
        .expect_err("blank city");

    assert_eq!(error, ProviderError::InvalidCity);
    assert_eq!(received_count(&server).await, 0);
}

#[tokio::test]
async fn cancelled_token_stops_before_first_request() {
    let server = MockServer::start().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let error = client_for(&server)
        .current_conditions("London", TemperatureUnit::Celsius, &cancel)
        .await
        .expect_err("cancelled");

    assert_eq!(error, ProviderError::Cancelled);
    assert_eq!(received_count(&server).await, 0);
}
