use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use stratus_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG_FAILURE};

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key_path: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key_path, env_keys, value: value.into() }
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::text(
                EXIT_CONFIG_FAILURE,
                format!("config validation failed: {error}"),
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
    ];
    for field in fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    CommandResult::text(0, lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("server.bind_address", &["STRATUS_SERVER_BIND_ADDRESS"], &config.server.bind_address),
        Field::new("server.port", &["STRATUS_SERVER_PORT", "PORT"], config.server.port.to_string()),
        Field::new(
            "server.request_timeout_secs",
            &["STRATUS_SERVER_REQUEST_TIMEOUT_SECS"],
            config.server.request_timeout_secs.to_string(),
        ),
        Field::new(
            "server.cors_permissive",
            &["STRATUS_SERVER_CORS_PERMISSIVE"],
            config.server.cors_permissive.to_string(),
        ),
        Field::new(
            "server.sweep_interval_secs",
            &["STRATUS_SERVER_SWEEP_INTERVAL_SECS"],
            config.server.sweep_interval_secs.to_string(),
        ),
        Field::new(
            "auth.require_api_key",
            &["STRATUS_AUTH_REQUIRE_API_KEY", "REQUIRE_API_KEY"],
            config.auth.require_api_key.to_string(),
        ),
        Field::new(
            "auth.api_key",
            &["STRATUS_AUTH_API_KEY", "BACKEND_API_KEY"],
            redact_optional(config.auth.api_key.as_ref()),
        ),
        Field::new(
            "rate_limit.max_requests",
            &["STRATUS_RATE_LIMIT_MAX_REQUESTS"],
            config.rate_limit.max_requests.to_string(),
        ),
        Field::new(
            "rate_limit.window_secs",
            &["STRATUS_RATE_LIMIT_WINDOW_SECS"],
            config.rate_limit.window_secs.to_string(),
        ),
        Field::new(
            "retry.max_attempts",
            &["STRATUS_RETRY_MAX_ATTEMPTS"],
            config.retry.max_attempts.to_string(),
        ),
        Field::new("retry.delay_ms", &["STRATUS_RETRY_DELAY_MS"], config.retry.delay_ms.to_string()),
        Field::new(
            "session.max_history_turns",
            &["STRATUS_SESSION_MAX_HISTORY_TURNS"],
            config.session.max_history_turns.to_string(),
        ),
        Field::new(
            "session.idle_ttl_secs",
            &["STRATUS_SESSION_IDLE_TTL_SECS"],
            config.session.idle_ttl_secs.to_string(),
        ),
        Field::new("weather.base_url", &["STRATUS_WEATHER_BASE_URL"], &config.weather.base_url),
        Field::new(
            "weather.api_key",
            &["STRATUS_WEATHER_API_KEY", "OPENWEATHER_API_KEY"],
            redact_token(config.weather.api_key.expose_secret()),
        ),
        Field::new(
            "weather.timeout_secs",
            &["STRATUS_WEATHER_TIMEOUT_SECS"],
            config.weather.timeout_secs.to_string(),
        ),
        Field::new("llm.provider", &["STRATUS_LLM_PROVIDER"], format!("{:?}", config.llm.provider)),
        Field::new("llm.model", &["STRATUS_LLM_MODEL"], &config.llm.model),
        Field::new(
            "llm.base_url",
            &["STRATUS_LLM_BASE_URL"],
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.api_key", &["STRATUS_LLM_API_KEY"], redact_optional(config.llm.api_key.as_ref())),
        Field::new(
            "llm.timeout_secs",
            &["STRATUS_LLM_TIMEOUT_SECS"],
            config.llm.timeout_secs.to_string(),
        ),
        Field::new(
            "logging.level",
            &["STRATUS_LOGGING_LEVEL", "STRATUS_LOG_LEVEL"],
            &config.logging.level,
        ),
        Field::new(
            "logging.format",
            &["STRATUS_LOGGING_FORMAT", "STRATUS_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("stratus.toml"), PathBuf::from("config/stratus.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_optional(secret: Option<&SecretString>) -> String {
    secret.map_or_else(|| "<unset>".to_string(), |secret| redact_token(secret.expose_secret()))
}

/// Keeps a recognizable prefix such as `sk-` and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
