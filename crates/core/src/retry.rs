//! Bounded retries with a fixed delay between attempts.
//!
//! Only failures the error type marks as retryable get another attempt. The cancellation token is
//! checked before each attempt and raced against both the attempt and the delay, so a cancelled
//! request stops without waiting out the remaining attempts.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Classifies a failure as transient (worth another attempt) or permanent.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self { max_attempts: config.max_attempts, delay: config.delay() }
    }

    fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("permanent failure: {0}")]
    Permanent(E),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent(_) => 1,
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// The last underlying failure, when one was observed.
    pub fn into_last(self) -> Option<E> {
        match self {
            Self::Permanent(last) | Self::Exhausted { last, .. } => Some(last),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Runs an async operation under a fixed-delay retry policy.
#[derive(Clone, Debug, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Invokes `operation` with the 1-based attempt number until it succeeds, fails permanently,
    /// runs out of attempts or `cancel` fires. Cancellation also interrupts an in-flight attempt
    /// and the delay between attempts.
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let max_attempts = self.policy.effective_attempts();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(event_name = "retry.attempt.cancelled", attempt, "attempt cancelled");
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                outcome = operation(attempt) => outcome,
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(event_name = "retry.recovered", attempt, "operation recovered");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!(
                    event_name = "retry.permanent_failure",
                    attempt,
                    error = %error,
                    "operation failed permanently"
                );
                return Err(RetryError::Permanent(error));
            }

            if attempt >= max_attempts {
                warn!(
                    event_name = "retry.exhausted",
                    attempt,
                    max_attempts,
                    error = %error,
                    "operation failed after final attempt"
                );
                return Err(RetryError::Exhausted { attempts: attempt, last: error });
            }

            warn!(
                event_name = "retry.attempt.failed",
                attempt,
                max_attempts,
                delay_ms = self.policy.delay.as_millis() as u64,
                error = %error,
                "attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(self.policy.delay) => {}
            }
        }
    }
}
