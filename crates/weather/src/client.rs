use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use stratus_core::config::WeatherConfig;
use stratus_core::retry::{RetryExecutor, RetryPolicy};
use stratus_core::TemperatureUnit;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProviderError;
use crate::forecast::{summarize, FORECAST_DAYS};
use crate::model::{CurrentConditions, CurrentPayload, DailyForecast, ForecastPayload};

const MAX_CITY_LEN: usize = 100;

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_conditions(
        &self,
        city: &str,
        unit: TemperatureUnit,
        cancel: &CancellationToken,
    ) -> Result<CurrentConditions, ProviderError>;

    async fn forecast_summary(
        &self,
        city: &str,
        unit: TemperatureUnit,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyForecast>, ProviderError>;
}

/// OpenWeatherMap-compatible HTTP client. Every call runs through the retry executor.
pub struct WeatherClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    retry: RetryExecutor,
}

impl WeatherClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
        retry: RetryExecutor,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ProviderError::Network(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { http, base_url, api_key, retry })
    }

    pub fn from_config(config: &WeatherConfig, policy: RetryPolicy) -> Result<Self, ProviderError> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
            RetryExecutor::new(policy),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs request, decode and `shape` as one attempt, so a payload that decodes but cannot be
    /// shaped is retried like any other malformed answer.
    async fn fetch<T, R>(
        &self,
        endpoint: &str,
        city: &str,
        unit: TemperatureUnit,
        cancel: &CancellationToken,
        shape: fn(T, &str) -> Result<R, ProviderError>,
    ) -> Result<R, ProviderError>
    where
        T: DeserializeOwned + Send,
        R: Send,
    {
        let city = validate_city(city)?;
        let url = format!("{}/data/2.5/{endpoint}", self.base_url);
        let url = url.as_str();

        self.retry
            .execute(cancel, move |attempt| async move {
                let payload = self.fetch_once::<T>(url, city, unit, attempt).await?;
                shape(payload, city)
            })
            .await
            .map_err(ProviderError::from)
    }

    async fn fetch_once<T: DeserializeOwned>(
        &self,
        url: &str,
        city: &str,
        unit: TemperatureUnit,
        attempt: u32,
    ) -> Result<T, ProviderError> {
        debug!(
            event_name = "weather.provider.request",
            city = %city,
            units = unit.provider_units(),
            attempt,
            "calling weather provider"
        );

        let response = self
            .http
            .get(url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.expose_secret()),
                ("units", unit.provider_units()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::UnknownCity { city: city.to_string() });
        }
        if !status.is_success() {
            return Err(ProviderError::Status { status: status.as_u16() });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|error| ProviderError::Malformed(error.to_string()))
    }
}

#[async_trait]
impl WeatherProvider for WeatherClient {
    async fn current_conditions(
        &self,
        city: &str,
        unit: TemperatureUnit,
        cancel: &CancellationToken,
    ) -> Result<CurrentConditions, ProviderError> {
        self.fetch("weather", city, unit, cancel, current_from_payload).await
    }

    async fn forecast_summary(
        &self,
        city: &str,
        unit: TemperatureUnit,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyForecast>, ProviderError> {
        self.fetch("forecast", city, unit, cancel, forecast_from_payload).await
    }
}

fn current_from_payload(
    payload: CurrentPayload,
    city: &str,
) -> Result<CurrentConditions, ProviderError> {
    let description = payload
        .weather
        .first()
        .map(|condition| condition.description.clone())
        .ok_or_else(|| ProviderError::Malformed("current payload has no condition".to_string()))?;

    Ok(CurrentConditions {
        city: city.to_string(),
        description,
        temperature: payload.main.temp,
        feels_like: payload.main.feels_like,
        humidity: payload.main.humidity.round().clamp(0.0, 100.0) as u8,
    })
}

fn forecast_from_payload(
    payload: ForecastPayload,
    _city: &str,
) -> Result<Vec<DailyForecast>, ProviderError> {
    summarize(&payload.list, FORECAST_DAYS)
}

/// Rejects city names that cannot be a real place before any request goes out.
pub fn validate_city(city: &str) -> Result<&str, ProviderError> {
    let city = city.trim();
    if city.is_empty() || city.chars().count() > MAX_CITY_LEN {
        return Err(ProviderError::InvalidCity);
    }
    if city.chars().any(|ch| ch.is_control()) {
        return Err(ProviderError::InvalidCity);
    }
    Ok(city)
}
