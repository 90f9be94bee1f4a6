//! Per-client sliding-window admission.
//!
//! Each client owns a queue of the instants at which its requests were admitted. On every
//! admission attempt the instants that have fallen out of the trailing window are purged before
//! counting, so the budget recovers gradually rather than on fixed window boundaries.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::errors::RateLimitExceeded;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    /// Requests still available to the client in the current window.
    pub remaining: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { windows: DashMap::new(), max_requests, window }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn admit(&self, client: &str) -> Result<Admission, RateLimitExceeded> {
        self.admit_at(client, Instant::now())
    }

    /// Admission against an explicit clock reading.
    ///
    /// The purge, count and append run under the client's entry lock, so concurrent requests
    /// from one client cannot both observe the last free slot.
    pub fn admit_at(&self, client: &str, now: Instant) -> Result<Admission, RateLimitExceeded> {
        let mut entry = self.windows.entry(client.to_string()).or_default();
        let window = entry.value_mut();
        purge_expired(window, now, self.window);

        let used = window.len() as u32;
        if used >= self.max_requests {
            warn!(
                event_name = "gateway.rate_limit.rejected",
                client_id = %client,
                request_count = used,
                limit = self.max_requests,
                "rate limit exceeded"
            );
            return Err(RateLimitExceeded {
                client: client.to_string(),
                limit: self.max_requests,
                window: self.window,
            });
        }

        window.push_back(now);
        let remaining = self.max_requests - used - 1;
        debug!(
            event_name = "gateway.rate_limit.admitted",
            client_id = %client,
            remaining,
            "request admitted"
        );

        Ok(Admission { remaining })
    }

    /// Requests the client could still make at `now` without being rejected.
    pub fn remaining_at(&self, client: &str, now: Instant) -> u32 {
        let Some(window) = self.windows.get(client) else {
            return self.max_requests;
        };
        let live = window.iter().filter(|admitted| !is_expired(**admitted, now, self.window)).count();
        self.max_requests.saturating_sub(live as u32)
    }

    /// Drops clients with no admissions left inside the window. Returns how many were removed.
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            purge_expired(window, now, self.window);
            !window.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn is_expired(admitted: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(admitted) >= window
}

fn purge_expired(window: &mut VecDeque<Instant>, now: Instant, length: Duration) {
    while let Some(oldest) = window.front() {
        if !is_expired(*oldest, now, length) {
            break;
        }
        window.pop_front();
    }
}
