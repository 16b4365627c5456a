//! Token-bucket admission gate.
//!
//! Every provider owns one [`RateLimiter`].  The bucket starts full with
//! `capacity` tokens and refills continuously at `capacity / window`, capped
//! at `capacity`.  [`RateLimiter::try_acquire`] never blocks: it either takes
//! a token or reports that admission is denied.
//!
//! Because refill is proportional to elapsed time, a burst straddling a
//! window boundary may briefly exceed `capacity` per wall-clock window.  That
//! averaging is accepted; what never happens is more than `capacity`
//! admissions inside one window starting from a full bucket.
//!
//! Time is read from [`tokio::time::Instant`], so tests running with a paused
//! clock observe deterministic refills.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::{KernelError, Result};

/// Mutable bucket state, only ever touched under the limiter's lock.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Point-in-time view of a limiter, exposed through stats endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStatus {
    /// Whole tokens currently available.
    pub available: u32,
    /// Maximum tokens the bucket can hold.
    pub capacity: u32,
    /// Window over which `capacity` tokens are refilled.
    pub window_secs: f64,
}

/// Non-blocking token-bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a limiter admitting `capacity` calls per `window`.
    pub fn new(capacity: u32, window: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(KernelError::InvalidConfig {
                reason: "rate limiter capacity must be at least 1".into(),
            });
        }
        if window.is_zero() {
            return Err(KernelError::InvalidConfig {
                reason: "rate limiter window must be non-zero".into(),
            });
        }

        Ok(Self {
            capacity,
            window,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        })
    }

    /// Try to take one token.  Returns `false` when admission is denied.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            tracing::trace!(remaining = state.tokens, "rate limiter admitted call");
            true
        } else {
            tracing::debug!(
                capacity = self.capacity,
                window_secs = self.window.as_secs_f64(),
                "rate limiter denied admission"
            );
            false
        }
    }

    /// Snapshot of the current bucket level.
    pub fn status(&self) -> RateLimiterStatus {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);

        RateLimiterStatus {
            available: state.tokens.floor() as u32,
            capacity: self.capacity,
            window_secs: self.window.as_secs_f64(),
        }
    }

    /// Maximum tokens the bucket holds.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Refill window.
    pub fn window(&self) -> Duration {
        self.window
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed.is_zero() {
            return;
        }

        let rate = f64::from(self.capacity) / self.window.as_secs_f64();
        state.tokens = (state.tokens + elapsed.as_secs_f64() * rate).min(f64::from(self.capacity));
        state.last_refill = now;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn denies_after_capacity_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60)).unwrap();
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn refills_proportionally_to_elapsed_time() {
        let limiter = RateLimiter::new(4, Duration::from_secs(60)).unwrap();
        for _ in 0..4 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        // A quarter window buys back exactly one token.
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_capped_at_capacity() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10)).unwrap();
        tokio::time::advance(Duration::from_secs(600)).await;

        let status = limiter.status();
        assert_eq!(status.available, 2);
        assert_eq!(status.capacity, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_remaining_tokens() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60)).unwrap();
        limiter.try_acquire();
        limiter.try_acquire();
        assert_eq!(limiter.status().available, 3);
        assert_eq!(limiter.status().window_secs, 60.0);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(RateLimiter::new(0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(RateLimiter::new(1, Duration::ZERO).is_err());
    }
}
