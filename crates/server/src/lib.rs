pub mod api;
pub mod bootstrap;
pub mod gateway;
pub mod health;
pub mod sweeper;

use std::time::Duration;

use anyhow::{Context, Result};
use stratus_core::config::{AppConfig, LoadOptions, LogFormat};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

pub use api::{router, ApiState};
pub use gateway::{ApiKeyPolicy, Gateway, SweepReport};

/// Installs the global subscriber. `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    // A second init (tests, embedded use) keeps the first subscriber.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let address = app.config.server.listen_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind gateway listener on {address}"))?;

    let shutdown = CancellationToken::new();
    let sweeper = sweeper::spawn(
        app.gateway.clone(),
        Duration::from_secs(app.config.server.sweep_interval_secs),
        shutdown.clone(),
    );

    let state = ApiState {
        gateway: app.gateway.clone(),
        request_timeout: Duration::from_secs(app.config.server.request_timeout_secs),
    };
    let routes = router(state, app.config.server.cors_permissive);

    tracing::info!(
        event_name = "system.server.started",
        address = %address,
        "stratus gateway listening"
    );
    axum::serve(listener, routes).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "stratus gateway stopping");
    shutdown.cancel();
    sweeper.await.context("idle sweeper task failed")?;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            event_name = "system.server.signal_error",
            error = %error,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}
