use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::gateway::Gateway;

/// Periodically evicts idle rate-limit windows and expired sessions until `shutdown` fires.
pub fn spawn(gateway: Arc<Gateway>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = gateway.sweep_idle(Instant::now().into_std());
                    if report.rate_windows + report.sessions > 0 {
                        info!(
                            event_name = "gateway.sweep.evicted",
                            rate_windows = report.rate_windows,
                            sessions = report.sessions,
                            "evicted idle gateway state"
                        );
                    }
                }
            }
        }

        debug!(event_name = "gateway.sweep.stopped", "idle sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use stratus_agent::{AgentRuntime, HandlerRegistry, KeywordReasoner};
    use stratus_core::{RateLimiter, SessionId, SessionRegistry, TemperatureUnit};
    use stratus_weather::{CurrentConditions, DailyForecast, ProviderError, WeatherProvider};
    use tokio_util::sync::CancellationToken;

    use crate::gateway::{ApiKeyPolicy, Gateway};

    struct OfflineProvider;

    #[async_trait]
    impl WeatherProvider for OfflineProvider {
        async fn current_conditions(
            &self,
            _city: &str,
            _unit: TemperatureUnit,
            _cancel: &CancellationToken,
        ) -> Result<CurrentConditions, ProviderError> {
            Err(ProviderError::Timeout)
        }

        async fn forecast_summary(
            &self,
            _city: &str,
            _unit: TemperatureUnit,
            _cancel: &CancellationToken,
        ) -> Result<Vec<DailyForecast>, ProviderError> {
            Err(ProviderError::Timeout)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_expired_sessions_and_stops_on_shutdown() {
        let gateway = Arc::new(Gateway::new(
            RateLimiter::new(20, Duration::from_secs(60)),
            SessionRegistry::new(20, Some(Duration::from_secs(5))),
            AgentRuntime::new(
                Arc::new(KeywordReasoner::new()),
                HandlerRegistry::weather(Arc::new(OfflineProvider)),
            ),
            ApiKeyPolicy::disabled(),
        ));
        let id = SessionId("idle".to_string());
        gateway.sessions().resolve(&id);

        let shutdown = CancellationToken::new();
        let handle = super::spawn(Arc::clone(&gateway), Duration::from_secs(10), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!gateway.sessions().contains(&id));

        shutdown.cancel();
        handle.await.expect("sweeper task should exit cleanly");
    }
}
