//! Bounded exponential backoff.
//!
//! [`RetryPolicy`] runs an async operation up to `max_attempts` times.  Each
//! attempt races the operation against the per-attempt timeout.  After a
//! failed attempt with attempts remaining, the policy waits
//! `base_delay * 2^attempt_index` (capped at `max_delay`) before trying
//! again; no wait follows the final attempt.
//!
//! Cancellation is cooperative: the caller's [`CancellationToken`] is
//! observed both while an attempt is in flight and while backing off, so a
//! cancelled token interrupts the loop within one backoff interval and
//! surfaces [`RetryError::Cancelled`].
//!
//! Provider calls and step-scoped retries each build their own policy
//! instance, so their attempt budgets never interfere.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable retry parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.  Values below 1 are treated
    /// as 1.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles for every later attempt.
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay.
    pub max_delay_ms: u64,

    /// Deadline for one attempt.  `0` disables the per-attempt timeout.
    pub attempt_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            attempt_timeout_ms: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome / error types
// ---------------------------------------------------------------------------

/// A successful run together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    /// The value produced by the successful attempt.
    pub value: T,
    /// Attempts made, `1` meaning the first try succeeded.
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Whether at least one attempt failed before the success.
    pub fn retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Why a retried operation ultimately did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The cancellation token fired.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// The last attempt exceeded the per-attempt timeout.
    #[error("attempt {attempts} timed out after {after:?}")]
    TimedOut { attempts: u32, after: Duration },

    /// The last attempt returned an error.
    #[error("failed after {attempts} attempt(s): {error}")]
    Failed { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of attempts that were started.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Cancelled { attempts }
            | Self::TimedOut { attempts, .. }
            | Self::Failed { attempts, .. } => *attempts,
        }
    }

    /// Whether the loop stopped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Exponential-backoff retry loop with per-attempt timeout and cancellation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from explicit configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The configuration this policy runs with.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Effective attempt budget (never below 1).
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Backoff inserted after the attempt with zero-based `attempt_index`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt_index);
        let millis = self
            .config
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.config.max_delay_ms);
        Duration::from_millis(millis)
    }

    fn attempt_timeout(&self) -> Option<Duration> {
        (self.config.attempt_timeout_ms > 0)
            .then(|| Duration::from_millis(self.config.attempt_timeout_ms))
    }

    /// Run `op`, retrying every failure until the budget is spent.
    ///
    /// `op` receives the one-based attempt number.
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<RetryOutcome<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_if(cancel, op, |_| true).await
    }

    /// Run `op`, retrying only failures for which `should_retry` is true.
    ///
    /// A non-retryable error ends the loop immediately.  Timeouts are always
    /// considered retryable.
    pub async fn execute_if<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        should_retry: P,
    ) -> Result<RetryOutcome<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts();
        let timeout = self.attempt_timeout();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;
            debug!(attempt, max_attempts, "starting attempt");

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                result = run_attempt(op(attempt), timeout) => result,
            };

            let failure = match result {
                Some(Ok(value)) => {
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt,
                    });
                }
                Some(Err(error)) => {
                    let retryable = should_retry(&error);
                    warn!(attempt, max_attempts, retryable, %error, "attempt failed");
                    let failure = RetryError::Failed {
                        attempts: attempt,
                        error,
                    };
                    if !retryable {
                        return Err(failure);
                    }
                    failure
                }
                None => {
                    let after = timeout.unwrap_or_default();
                    warn!(attempt, max_attempts, timeout = ?after, "attempt timed out");
                    RetryError::TimedOut {
                        attempts: attempt,
                        after,
                    }
                }
            };

            if attempt >= max_attempts {
                return Err(failure);
            }

            let delay = self.delay_for(attempt - 1);
            debug!(attempt, delay = ?delay, "backing off before next attempt");
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Await one attempt, returning `None` if it exceeded `timeout`.
async fn run_attempt<T, E, Fut>(fut: Fut, timeout: Option<Duration>) -> Option<Result<T, E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
