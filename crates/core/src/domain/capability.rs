use std::fmt;

use serde::{Deserialize, Serialize};

/// A unit of work the assistant can delegate a request to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CurrentWeather,
    Forecast,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::CurrentWeather, Capability::Forecast];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CurrentWeather => "current_weather",
            Self::Forecast => "forecast",
        }
    }

    /// Short description handed to reasoning engines alongside the capability name.
    pub fn description(self) -> &'static str {
        match self {
            Self::CurrentWeather => "current conditions for a city right now",
            Self::Forecast => "multi-day forecast for a city",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureUnit {
    /// Case-insensitive match on the unit name or its one-letter abbreviation.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "celsius" | "c" | "metric" => Some(Self::Celsius),
            "fahrenheit" | "f" | "imperial" => Some(Self::Fahrenheit),
            "kelvin" | "k" | "standard" => Some(Self::Kelvin),
            _ => None,
        }
    }

    /// Value of the provider's `units` query parameter.
    pub fn provider_units(self) -> &'static str {
        match self {
            Self::Celsius => "metric",
            Self::Fahrenheit => "imperial",
            Self::Kelvin => "standard",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Kelvin => "K",
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Celsius => "Celsius",
            Self::Fahrenheit => "Fahrenheit",
            Self::Kelvin => "Kelvin",
        };
        f.write_str(label)
    }
}
