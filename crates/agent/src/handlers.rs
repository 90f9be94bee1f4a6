use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use stratus_core::{Capability, TemperatureUnit};
use stratus_weather::{CurrentConditions, DailyForecast, ProviderError, WeatherProvider};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Serves one capability. Always produces user-facing text, including on failure.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    fn capability(&self) -> Capability;

    async fn handle(&self, city: &str, unit: TemperatureUnit, cancel: &CancellationToken) -> String;
}

pub struct CurrentWeatherHandler {
    provider: Arc<dyn WeatherProvider>,
}

impl CurrentWeatherHandler {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CapabilityHandler for CurrentWeatherHandler {
    fn capability(&self) -> Capability {
        Capability::CurrentWeather
    }

    async fn handle(&self, city: &str, unit: TemperatureUnit, cancel: &CancellationToken) -> String {
        match until_cancelled(cancel, self.provider.current_conditions(city, unit, cancel)).await {
            Ok(conditions) => render_current(&conditions, unit),
            Err(error) => failure_reply(self.capability(), city, &error),
        }
    }
}

pub struct ForecastHandler {
    provider: Arc<dyn WeatherProvider>,
}

impl ForecastHandler {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CapabilityHandler for ForecastHandler {
    fn capability(&self) -> Capability {
        Capability::Forecast
    }

    async fn handle(&self, city: &str, unit: TemperatureUnit, cancel: &CancellationToken) -> String {
        match until_cancelled(cancel, self.provider.forecast_summary(city, unit, cancel)).await {
            Ok(days) if days.is_empty() => {
                format!("Sorry, no forecast data is available for {} right now.", city.trim())
            }
            Ok(days) => render_forecast(city.trim(), &days, unit),
            Err(error) => failure_reply(self.capability(), city, &error),
        }
    }
}

/// Stops waiting on the provider once the request is cancelled, even if the provider itself
/// does not watch the token.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    lookup: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        result = lookup => result,
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Capability, Arc<dyn CapabilityHandler>>,
}

impl HandlerRegistry {
    /// Registry with both weather handlers sharing one provider.
    pub fn weather(provider: Arc<dyn WeatherProvider>) -> Self {
        let mut registry = Self::default();
        registry.register(CurrentWeatherHandler::new(Arc::clone(&provider)));
        registry.register(ForecastHandler::new(provider));
        registry
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: CapabilityHandler + 'static,
    {
        self.handlers.insert(handler.capability(), Arc::new(handler));
    }

    pub fn get(&self, capability: Capability) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(&capability).cloned()
    }

    /// Registered capabilities in a stable order.
    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL.into_iter().filter(|capability| self.handlers.contains_key(capability)).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

pub fn render_current(conditions: &CurrentConditions, unit: TemperatureUnit) -> String {
    format!(
        "Current weather in {}: {}\nTemperature: {}{} (feels like {}{}).\nHumidity: {}%.",
        conditions.city,
        capitalize(&conditions.description),
        format_temperature(conditions.temperature),
        unit.symbol(),
        format_temperature(conditions.feels_like),
        unit.symbol(),
        conditions.humidity,
    )
}

pub fn render_forecast(city: &str, days: &[DailyForecast], unit: TemperatureUnit) -> String {
    let mut text = format!("{}-day forecast for {city}:", days.len());
    for day in days {
        text.push_str(&format!(
            "\n{}: {}, avg temp {}{}",
            day.date,
            day.dominant_condition,
            format_temperature(day.average_temperature),
            unit.symbol(),
        ));
    }
    text
}

fn failure_reply(capability: Capability, city: &str, error: &ProviderError) -> String {
    warn!(
        event_name = "agent.handler.failed",
        capability = %capability,
        city = %city,
        error_kind = error.kind(),
        error = %error,
        "capability handler could not fetch weather"
    );

    let city = city.trim();
    let root = match error {
        ProviderError::RetriesExhausted { last, .. } => last.as_ref(),
        other => other,
    };
    match root {
        ProviderError::InvalidCity => {
            "Sorry, I need a valid city name to look up the weather. Which city do you mean?"
                .to_string()
        }
        ProviderError::UnknownCity { .. } => format!(
            "Sorry, I couldn't find weather data for {city}. Please check the city name and try again."
        ),
        ProviderError::Cancelled | ProviderError::Timeout => {
            "Sorry, the weather lookup took too long and was stopped. Please try again.".to_string()
        }
        _ => "Sorry, the weather service is unavailable right now. Please try again shortly."
            .to_string(),
    }
}

/// One decimal place, without a trailing `.0`.
fn format_temperature(value: f64) -> String {
    // Adding zero folds -0.0 into 0.0.
    let rounded = (value * 10.0).round() / 10.0 + 0.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        format!("{rounded:.1}")
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
