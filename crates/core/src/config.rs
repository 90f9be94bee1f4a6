use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub session: SessionConfig,
    pub weather: WeatherConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub cors_permissive: bool,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub require_api_key: bool,
    pub api_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub max_history_turns: usize,
    pub idle_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WeatherConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: ReasonerProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Which reasoning engine classifies inbound messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonerProvider {
    Keyword,
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub require_api_key: Option<bool>,
    pub api_key: Option<String>,
    pub rate_limit_max_requests: Option<u32>,
    pub rate_limit_window_secs: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub weather_base_url: Option<String>,
    pub weather_api_key: Option<String>,
    pub llm_provider: Option<ReasonerProvider>,
    pub llm_model: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                request_timeout_secs: 30,
                cors_permissive: true,
                sweep_interval_secs: 300,
            },
            auth: AuthConfig { require_api_key: false, api_key: None },
            rate_limit: RateLimitConfig { max_requests: 20, window_secs: 60 },
            retry: RetryConfig { max_attempts: 3, delay_ms: 1_000 },
            session: SessionConfig { max_history_turns: 20, idle_ttl_secs: 86_400 },
            weather: WeatherConfig {
                base_url: "https://api.openweathermap.org".to_string(),
                api_key: String::new().into(),
                timeout_secs: 10,
            },
            llm: LlmConfig {
                provider: ReasonerProvider::Keyword,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl SessionConfig {
    /// `None` when idle sessions are kept for the lifetime of the process.
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs))
    }
}

impl ServerConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ReasonerProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected keyword|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("stratus.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(request_timeout_secs) = server.request_timeout_secs {
                self.server.request_timeout_secs = request_timeout_secs;
            }
            if let Some(cors_permissive) = server.cors_permissive {
                self.server.cors_permissive = cors_permissive;
            }
            if let Some(sweep_interval_secs) = server.sweep_interval_secs {
                self.server.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(require_api_key) = auth.require_api_key {
                self.auth.require_api_key = require_api_key;
            }
            if let Some(api_key_value) = auth.api_key {
                self.auth.api_key = Some(secret_value(api_key_value));
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            if let Some(max_requests) = rate_limit.max_requests {
                self.rate_limit.max_requests = max_requests;
            }
            if let Some(window_secs) = rate_limit.window_secs {
                self.rate_limit.window_secs = window_secs;
            }
        }

        if let Some(retry) = patch.retry {
            if let Some(max_attempts) = retry.max_attempts {
                self.retry.max_attempts = max_attempts;
            }
            if let Some(delay_ms) = retry.delay_ms {
                self.retry.delay_ms = delay_ms;
            }
        }

        if let Some(session) = patch.session {
            if let Some(max_history_turns) = session.max_history_turns {
                self.session.max_history_turns = max_history_turns;
            }
            if let Some(idle_ttl_secs) = session.idle_ttl_secs {
                self.session.idle_ttl_secs = idle_ttl_secs;
            }
        }

        if let Some(weather) = patch.weather {
            if let Some(base_url) = weather.base_url {
                self.weather.base_url = base_url;
            }
            if let Some(weather_api_key_value) = weather.api_key {
                self.weather.api_key = secret_value(weather_api_key_value);
            }
            if let Some(timeout_secs) = weather.timeout_secs {
                self.weather.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STRATUS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("STRATUS_SERVER_PORT").or_else(|| read_env("PORT")) {
            self.server.port = parse_u16("STRATUS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("STRATUS_SERVER_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs =
                parse_u64("STRATUS_SERVER_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("STRATUS_SERVER_CORS_PERMISSIVE") {
            self.server.cors_permissive = parse_bool("STRATUS_SERVER_CORS_PERMISSIVE", &value)?;
        }
        if let Some(value) = read_env("STRATUS_SERVER_SWEEP_INTERVAL_SECS") {
            self.server.sweep_interval_secs =
                parse_u64("STRATUS_SERVER_SWEEP_INTERVAL_SECS", &value)?;
        }

        let require_api_key =
            read_env("STRATUS_AUTH_REQUIRE_API_KEY").or_else(|| read_env("REQUIRE_API_KEY"));
        if let Some(value) = require_api_key {
            self.auth.require_api_key = parse_bool("STRATUS_AUTH_REQUIRE_API_KEY", &value)?;
        }
        let api_key = read_env("STRATUS_AUTH_API_KEY").or_else(|| read_env("BACKEND_API_KEY"));
        if let Some(value) = api_key {
            self.auth.api_key = Some(secret_value(value));
        }

        if let Some(value) = read_env("STRATUS_RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = parse_u32("STRATUS_RATE_LIMIT_MAX_REQUESTS", &value)?;
        }
        if let Some(value) = read_env("STRATUS_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = parse_u64("STRATUS_RATE_LIMIT_WINDOW_SECS", &value)?;
        }

        if let Some(value) = read_env("STRATUS_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_u32("STRATUS_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("STRATUS_RETRY_DELAY_MS") {
            self.retry.delay_ms = parse_u64("STRATUS_RETRY_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("STRATUS_SESSION_MAX_HISTORY_TURNS") {
            self.session.max_history_turns =
                parse_u32("STRATUS_SESSION_MAX_HISTORY_TURNS", &value)? as usize;
        }
        if let Some(value) = read_env("STRATUS_SESSION_IDLE_TTL_SECS") {
            self.session.idle_ttl_secs = parse_u64("STRATUS_SESSION_IDLE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("STRATUS_WEATHER_BASE_URL") {
            self.weather.base_url = value;
        }
        let weather_api_key =
            read_env("STRATUS_WEATHER_API_KEY").or_else(|| read_env("OPENWEATHER_API_KEY"));
        if let Some(value) = weather_api_key {
            self.weather.api_key = secret_value(value);
        }
        if let Some(value) = read_env("STRATUS_WEATHER_TIMEOUT_SECS") {
            self.weather.timeout_secs = parse_u64("STRATUS_WEATHER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STRATUS_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("STRATUS_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("STRATUS_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("STRATUS_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("STRATUS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("STRATUS_LLM_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("STRATUS_LOGGING_LEVEL").or_else(|| read_env("STRATUS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STRATUS_LOGGING_FORMAT").or_else(|| read_env("STRATUS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(require_api_key) = overrides.require_api_key {
            self.auth.require_api_key = require_api_key;
        }
        if let Some(api_key) = overrides.api_key {
            self.auth.api_key = Some(secret_value(api_key));
        }
        if let Some(max_requests) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = max_requests;
        }
        if let Some(window_secs) = overrides.rate_limit_window_secs {
            self.rate_limit.window_secs = window_secs;
        }
        if let Some(max_attempts) = overrides.retry_max_attempts {
            self.retry.max_attempts = max_attempts;
        }
        if let Some(delay_ms) = overrides.retry_delay_ms {
            self.retry.delay_ms = delay_ms;
        }
        if let Some(base_url) = overrides.weather_base_url {
            self.weather.base_url = base_url;
        }
        if let Some(weather_api_key) = overrides.weather_api_key {
            self.weather.api_key = secret_value(weather_api_key);
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_rate_limit(&self.rate_limit)?;
        validate_retry(&self.retry)?;
        validate_session(&self.session)?;
        validate_weather(&self.weather)?;
        validate_llm(&self.llm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("stratus.toml"), PathBuf::from("config/stratus.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.request_timeout_secs == 0 || server.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "server.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if server.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "server.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    if !auth.require_api_key {
        return Ok(());
    }

    let missing =
        auth.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation(
            "auth.api_key is required when auth.require_api_key is true (set STRATUS_AUTH_API_KEY)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limit(rate_limit: &RateLimitConfig) -> Result<(), ConfigError> {
    if rate_limit.max_requests == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.max_requests must be greater than zero".to_string(),
        ));
    }

    if rate_limit.window_secs == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.window_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.max_attempts == 0 || retry.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "retry.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if retry.delay_ms > 60_000 {
        return Err(ConfigError::Validation(
            "retry.delay_ms must not exceed 60000".to_string(),
        ));
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.max_history_turns == 0 {
        return Err(ConfigError::Validation(
            "session.max_history_turns must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_weather(weather: &WeatherConfig) -> Result<(), ConfigError> {
    if weather.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "weather.api_key is required. Get one from https://home.openweathermap.org/api_keys"
                .to_string(),
        ));
    }

    if !weather.base_url.starts_with("http://") && !weather.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "weather.base_url must start with http:// or https://".to_string(),
        ));
    }

    if weather.timeout_secs == 0 || weather.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "weather.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        ReasonerProvider::Keyword => {}
        ReasonerProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        ReasonerProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    if llm.provider != ReasonerProvider::Keyword && llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    rate_limit: Option<RateLimitPatch>,
    retry: Option<RetryPatch>,
    session: Option<SessionPatch>,
    weather: Option<WeatherPatch>,
    llm: Option<LlmPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    request_timeout_secs: Option<u64>,
    cors_permissive: Option<bool>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    require_api_key: Option<bool>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    max_requests: Option<u32>,
    window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    max_attempts: Option<u32>,
    delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    max_history_turns: Option<usize>,
    idle_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WeatherPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<ReasonerProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
