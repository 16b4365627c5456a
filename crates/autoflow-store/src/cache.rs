//! Bounded, TTL'd response cache.
//!
//! [`ResponseCache`] memoizes generation results by fingerprint.  It holds at
//! most `capacity` entries; inserting past the bound evicts the
//! oldest-inserted entry (FIFO, reads do not refresh position).  Each entry
//! carries its own TTL.  Expired entries are not swept eagerly: they report a
//! miss and are removed on the next access, or by [`ResponseCache::purge_expired`].
//!
//! All operations run under one mutex so concurrent `get`/`put` pairs can
//! never lose updates or leave two entries for the same key.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

/// Default number of entries kept before FIFO eviction starts.
pub const DEFAULT_CAPACITY: usize = 100;

// ── cache stats ──────────────────────────────────────────────────────

/// Counters tracking cache effectiveness.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Total cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total cache misses since creation (expired lookups included).
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entries dropped to respect the capacity bound.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Entries dropped because their TTL elapsed.
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Total lookups (hits + misses).
    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Hit rate as a value between 0.0 and 1.0 (returns 0.0 if no lookups).
    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }

    /// Serializable copy of the counters.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            evictions: self.evictions(),
            expirations: self.expirations(),
            hit_rate: self.hit_rate(),
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} evictions={} rate={:.2}%",
            self.hits(),
            self.misses(),
            self.evictions(),
            self.hit_rate() * 100.0,
        )
    }
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}

// ── entries ──────────────────────────────────────────────────────────

/// One memoized value.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

// ── cache ────────────────────────────────────────────────────────────

/// FIFO-bounded cache with per-entry TTL.
pub struct ResponseCache<T> {
    name: &'static str,
    capacity: usize,
    entries: Mutex<IndexMap<String, CacheEntry<T>>>,
    stats: CacheStats,
}

impl<T> fmt::Debug for ResponseCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Clone> ResponseCache<T> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!(cache = name, capacity, "response cache created");
        Self {
            name,
            capacity,
            entries: Mutex::new(IndexMap::with_capacity(capacity)),
            stats: CacheStats::default(),
        }
    }

    /// Look up `key`.  Expired entries are removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let expired = match entries.get(key) {
            None => {
                self.stats.record_miss();
                debug!(cache = self.name, key, "cache miss");
                return None;
            }
            Some(entry) => entry.is_expired(Instant::now()),
        };

        if expired {
            entries.shift_remove(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            debug!(cache = self.name, key, "cache entry expired");
            return None;
        }

        self.stats.record_hit();
        debug!(cache = self.name, key, "cache hit");
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store `value` under `key` for `ttl`.
    ///
    /// Re-putting an existing key replaces it and counts as a fresh
    /// insertion for FIFO ordering.  A zero TTL is ignored.
    pub fn put(&self, key: impl Into<String>, value: T, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let key = key.into();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.shift_remove(&key);
        entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );

        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                self.stats.record_eviction();
                debug!(cache = self.name, key = %evicted, "cache eviction (fifo)");
            }
        }
        debug!(cache = self.name, key = %key, ttl = ?ttl, "cache insert");
    }

    /// Remove a specific entry.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.shift_remove(key).is_some()
    }

    /// Remove every entry, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = entries.len();
        entries.clear();
        debug!(cache = self.name, dropped, "cache cleared");
        dropped
    }

    /// Drop every expired entry now, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - entries.len();
        for _ in 0..purged {
            self.stats.record_expiration();
        }
        purged
    }
}

impl<T> ResponseCache<T> {
    /// Entries currently held, including expired ones not yet accessed.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Effectiveness counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn put_then_get_round_trips() {
        let cache = ResponseCache::new("test", 10);
        cache.put("k", "v".to_string(), TTL);
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_a_miss_and_removed() {
        let cache = ResponseCache::new("test", 10);
        cache.put("k", 1u32, Duration::from_secs(5));
        assert_eq!(cache.len(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_evicts_oldest_inserted() {
        let cache = ResponseCache::new("test", 2);
        cache.put("a", 1u32, TTL);
        cache.put("b", 2, TTL);
        // Reading `a` does not protect it: eviction is FIFO, not LRU.
        assert_eq!(cache.get("a"), Some(1));
        cache.put("c", 3, TTL);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reput_keeps_single_entry_and_refreshes_order() {
        let cache = ResponseCache::new("test", 2);
        cache.put("a", 1u32, TTL);
        cache.put("b", 2, TTL);
        cache.put("a", 10, TTL);
        assert_eq!(cache.len(), 2);

        cache.put("c", 3, TTL);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_sweeps_eagerly() {
        let cache = ResponseCache::new("test", 10);
        cache.put("short", 1u32, Duration::from_secs(1));
        cache.put("long", 2, Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_ttl_is_not_stored() {
        let cache = ResponseCache::new("test", 10);
        cache.put("k", 1u32, Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_reports_dropped_count() {
        let cache = ResponseCache::new("test", 10);
        cache.put("a", 1u32, TTL);
        cache.put("b", 2, TTL);
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn stats_display() {
        let cache: ResponseCache<u32> = ResponseCache::new("test", 10);
        cache.put("a", 1, TTL);
        let _ = cache.get("a");
        let _ = cache.get("missing");
        let display = format!("{}", cache.stats());
        assert!(display.contains("hits=1"));
        assert!(display.contains("misses=1"));
        assert!(display.contains("50.00%"));
    }

    #[test]
    fn hit_rate_no_lookups() {
        let cache: ResponseCache<u32> = ResponseCache::new("test", 10);
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }
}
