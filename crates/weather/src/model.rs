use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub city: String,
    pub description: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    /// Calendar date as `YYYY-MM-DD`, in the provider's reporting zone.
    pub date: String,
    pub dominant_condition: String,
    pub average_temperature: f64,
}

// Provider wire shapes. Only the fields the gateway reads are modelled.

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentPayload {
    pub weather: Vec<ConditionLabel>,
    pub main: Readings,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastPayload {
    pub list: Vec<ForecastSample>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastSample {
    pub dt_txt: String,
    pub main: SampleReadings,
    pub weather: Vec<ConditionLabel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConditionLabel {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Readings {
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SampleReadings {
    pub temp: f64,
}
