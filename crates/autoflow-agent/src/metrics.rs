//! Rolling per-provider metrics.
//!
//! The orchestrator ranks providers by the success rate recorded here.
//! Outcomes and latencies are kept in bounded ring buffers so old history
//! ages out; lifetime counters are kept alongside for reporting.
//! Execution feedback from finished workflows feeds the same outcome ring.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

/// Default number of recent outcomes/latencies retained per provider.
pub const DEFAULT_LATENCY_WINDOW: usize = 50;

/// Success rate assumed for providers with no history.
pub const NEUTRAL_SUCCESS_RATE: f64 = 0.5;

// ---------------------------------------------------------------------------
// Per-provider state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ProviderStats {
    success_count: u64,
    failure_count: u64,
    feedback_success: u64,
    feedback_failure: u64,
    outcomes: VecDeque<bool>,
    latencies_ms: VecDeque<u64>,
    last_error: Option<String>,
}

impl ProviderStats {
    fn push_outcome(&mut self, ok: bool, window: usize) {
        if self.outcomes.len() == window {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(ok);
    }

    fn push_latency(&mut self, latency_ms: u64, window: usize) {
        if self.latencies_ms.len() == window {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(latency_ms);
    }

    fn success_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        let ok = self.outcomes.iter().filter(|ok| **ok).count();
        Some(ok as f64 / self.outcomes.len() as f64)
    }

    fn snapshot(&self) -> ProviderMetrics {
        let (avg_latency_ms, p95_latency_ms) = if self.latencies_ms.is_empty() {
            (None, None)
        } else {
            let sum: u64 = self.latencies_ms.iter().sum();
            let avg = sum as f64 / self.latencies_ms.len() as f64;
            let mut sorted: Vec<u64> = self.latencies_ms.iter().copied().collect();
            sorted.sort_unstable();
            // Nearest-rank percentile.
            let rank = ((sorted.len() as f64) * 0.95).ceil() as usize;
            let p95 = sorted[rank.clamp(1, sorted.len()) - 1];
            (Some(avg), Some(p95))
        };

        ProviderMetrics {
            success_count: self.success_count,
            failure_count: self.failure_count,
            feedback_success: self.feedback_success,
            feedback_failure: self.feedback_failure,
            success_rate: self.success_rate(),
            avg_latency_ms,
            p95_latency_ms,
            last_error: self.last_error.clone(),
        }
    }
}

/// Serializable view of one provider's metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub feedback_success: u64,
    pub feedback_failure: u64,
    /// Rolling success rate, `None` without history.
    pub success_rate: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Concurrent per-provider metrics store.
///
/// Each record operation holds the provider's map shard for its whole
/// update, so concurrent recordings never lose counts.
#[derive(Debug)]
pub struct MetricsRecorder {
    window: usize,
    stats: DashMap<String, ProviderStats>,
}

impl MetricsRecorder {
    /// Create a recorder keeping `window` recent samples per provider.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            stats: DashMap::new(),
        }
    }

    /// Record a successful provider call.
    pub fn record_success(&self, provider: &str, latency: Duration) {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        let mut entry = self.stats.entry(provider.to_owned()).or_default();
        entry.success_count += 1;
        entry.push_outcome(true, self.window);
        entry.push_latency(latency_ms, self.window);
        debug!(provider, latency_ms, "recorded provider success");
    }

    /// Record a failed provider call and keep its error text.
    pub fn record_failure(&self, provider: &str, error: impl std::fmt::Display) {
        let mut entry = self.stats.entry(provider.to_owned()).or_default();
        entry.failure_count += 1;
        entry.push_outcome(false, self.window);
        entry.last_error = Some(error.to_string());
        debug!(provider, "recorded provider failure");
    }

    /// Record whether a workflow generated by `provider` executed cleanly.
    pub fn record_feedback(&self, provider: &str, success: bool) {
        let mut entry = self.stats.entry(provider.to_owned()).or_default();
        if success {
            entry.feedback_success += 1;
        } else {
            entry.feedback_failure += 1;
        }
        entry.push_outcome(success, self.window);
        debug!(provider, success, "recorded execution feedback");
    }

    /// Rolling success rate, `None` if the provider has no history.
    pub fn success_rate(&self, provider: &str) -> Option<f64> {
        self.stats.get(provider).and_then(|s| s.success_rate())
    }

    /// Success rate used for ranking: history or [`NEUTRAL_SUCCESS_RATE`].
    pub fn ranking_score(&self, provider: &str) -> f64 {
        self.success_rate(provider).unwrap_or(NEUTRAL_SUCCESS_RATE)
    }

    /// Metrics for one provider.
    pub fn provider(&self, provider: &str) -> Option<ProviderMetrics> {
        self.stats.get(provider).map(|s| s.snapshot())
    }

    /// Metrics for every provider with history, keyed by id.
    pub fn snapshot(&self) -> BTreeMap<String, ProviderMetrics> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    /// Forget all history.
    pub fn reset(&self) {
        self.stats.clear();
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_WINDOW)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_history_uses_neutral_score() {
        let metrics = MetricsRecorder::default();
        assert_eq!(metrics.success_rate("a"), None);
        assert_eq!(metrics.ranking_score("a"), NEUTRAL_SUCCESS_RATE);
    }

    #[test]
    fn success_rate_is_rolling() {
        let metrics = MetricsRecorder::new(4);
        metrics.record_failure("a", "boom");
        metrics.record_failure("a", "boom");
        for _ in 0..4 {
            metrics.record_success("a", Duration::from_millis(10));
        }
        // The two failures have rolled out of the 4-sample window.
        assert_eq!(metrics.success_rate("a"), Some(1.0));

        let snapshot = metrics.provider("a").unwrap();
        assert_eq!(snapshot.failure_count, 2);
        assert_eq!(snapshot.success_count, 4);
        assert_eq!(snapshot.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn latency_summary() {
        let metrics = MetricsRecorder::new(100);
        for ms in 1..=100 {
            metrics.record_success("a", Duration::from_millis(ms));
        }
        let snapshot = metrics.provider("a").unwrap();
        assert_eq!(snapshot.avg_latency_ms, Some(50.5));
        assert_eq!(snapshot.p95_latency_ms, Some(95));
    }

    #[test]
    fn feedback_moves_ranking() {
        let metrics = MetricsRecorder::default();
        metrics.record_success("a", Duration::from_millis(5));
        metrics.record_feedback("a", false);
        assert_eq!(metrics.success_rate("a"), Some(0.5));
        let snapshot = metrics.provider("a").unwrap();
        assert_eq!(snapshot.feedback_failure, 1);
    }

    #[test]
    fn snapshot_is_keyed_by_provider() {
        let metrics = MetricsRecorder::default();
        metrics.record_success("b", Duration::from_millis(1));
        metrics.record_failure("a", "x");
        let keys: Vec<_> = metrics.snapshot().into_keys().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
