use std::time::{Duration, Instant};

use serde::Serialize;
use stratus_agent::OpenAiCompatibleClient;
use stratus_core::config::{AppConfig, LoadOptions, ReasonerProvider};
use stratus_core::{RetryPolicy, TemperatureUnit};
use stratus_weather::{WeatherClient, WeatherProvider};
use tokio_util::sync::CancellationToken;

use crate::commands::{escape_json, CommandResult, EXIT_CONFIG_FAILURE, EXIT_RUNTIME_FAILURE};

const PROBE_CITY: &str = "London";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    elapsed_ms: u64,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            elapsed_ms: 0,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let (report, config_loaded) = build_report();
    let exit_code = match (config_loaded, report.overall_status) {
        (false, _) => EXIT_CONFIG_FAILURE,
        (true, CheckStatus::Fail) => EXIT_RUNTIME_FAILURE,
        (true, _) => 0,
    };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::text(exit_code, output);
    }

    CommandResult::text(exit_code, render_human(&report))
}

fn build_report() -> (DoctorReport, bool) {
    let mut checks = Vec::new();

    let started = Instant::now();
    let config_loaded = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                elapsed_ms: elapsed_ms(started),
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_reasoner(&config));
            checks.push(check_weather_provider(&config));
            true
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                elapsed_ms: elapsed_ms(started),
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped("reasoning_engine"));
            checks.push(DoctorCheck::skipped("weather_provider_reachability"));
            false
        }
    };

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    (DoctorReport { overall_status, summary, checks }, config_loaded)
}

fn check_reasoner(config: &AppConfig) -> DoctorCheck {
    let started = Instant::now();
    let (status, details) = match config.llm.provider {
        ReasonerProvider::Keyword => {
            (CheckStatus::Pass, "offline keyword reasoner, no remote model needed".to_string())
        }
        provider => match OpenAiCompatibleClient::from_config(&config.llm) {
            Ok(_) => (
                CheckStatus::Pass,
                format!("{provider:?} client configured for model `{}`", config.llm.model),
            ),
            Err(error) => (CheckStatus::Fail, error.to_string()),
        },
    };

    DoctorCheck { name: "reasoning_engine", status, elapsed_ms: elapsed_ms(started), details }
}

/// One unretried lookup against the configured provider; also proves the api key is accepted.
fn check_weather_provider(config: &AppConfig) -> DoctorCheck {
    let started = Instant::now();
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "weather_provider_reachability",
                status: CheckStatus::Fail,
                elapsed_ms: elapsed_ms(started),
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let single_attempt = RetryPolicy { max_attempts: 1, delay: Duration::ZERO };
    let result = runtime.block_on(async {
        let client = WeatherClient::from_config(&config.weather, single_attempt)?;
        client
            .current_conditions(PROBE_CITY, TemperatureUnit::Celsius, &CancellationToken::new())
            .await
    });

    let (status, details) = match result {
        Ok(conditions) => (
            CheckStatus::Pass,
            format!(
                "`{}` answered for {} ({})",
                config.weather.base_url, conditions.city, conditions.description
            ),
        ),
        Err(error) => (CheckStatus::Fail, format!("`{}`: {error}", config.weather.base_url)),
    };

    DoctorCheck {
        name: "weather_provider_reachability",
        status,
        elapsed_ms: elapsed_ms(started),
        details,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
