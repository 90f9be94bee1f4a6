use std::sync::Arc;

use stratus_agent::{KeywordReasoner, LlmReasoner, OpenAiCompatibleClient, ReasoningEngine, ReasoningError};
use stratus_core::config::{AppConfig, ConfigError, LoadOptions, ReasonerProvider};
use stratus_core::RetryPolicy;
use stratus_weather::{ProviderError, WeatherClient, WeatherProvider};
use thiserror::Error;
use tracing::info;

use crate::gateway::Gateway;

pub struct Application {
    pub config: AppConfig,
    pub gateway: Arc<Gateway>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("weather client setup failed: {0}")]
    Weather(#[source] ProviderError),
    #[error("reasoning engine setup failed: {0}")]
    Reasoner(#[source] ReasoningError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let retry = RetryPolicy::from_config(&config.retry);
    let provider: Arc<dyn WeatherProvider> = Arc::new(
        WeatherClient::from_config(&config.weather, retry).map_err(BootstrapError::Weather)?,
    );
    let engine = reasoning_engine(&config)?;
    info!(
        event_name = "system.bootstrap.components_ready",
        reasoner = engine.name(),
        weather_base_url = %config.weather.base_url,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        api_key_required = config.auth.require_api_key,
        "gateway components initialized"
    );

    let gateway = Arc::new(Gateway::from_config(&config, engine, provider));
    Ok(Application { config, gateway })
}

fn reasoning_engine(config: &AppConfig) -> Result<Arc<dyn ReasoningEngine>, BootstrapError> {
    match config.llm.provider {
        ReasonerProvider::Keyword => Ok(Arc::new(KeywordReasoner::new())),
        ReasonerProvider::OpenAi | ReasonerProvider::Ollama => {
            let client =
                OpenAiCompatibleClient::from_config(&config.llm).map_err(BootstrapError::Reasoner)?;
            Ok(Arc::new(LlmReasoner::new(client)))
        }
    }
}
