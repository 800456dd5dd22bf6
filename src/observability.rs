//! Metrics hooks and TTL policy for cached listings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Receives cache events from [`crate::expander::CacheExpander`].
///
/// Every method has a no-op default so an implementation only overrides
/// what it reports.
pub trait CacheMetrics: Send + Sync {
    fn record_hit(&self, _key: &str, _duration: Duration) {}

    fn record_miss(&self, _key: &str, _duration: Duration) {}

    fn record_error(&self, _key: &str, _error: &str) {}

    fn record_invalidation(&self, _tag: &str) {}
}

pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {}

/// Counters exposed on the health endpoint.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    invalidations: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetrics for CacheStats {
    fn record_hit(&self, key: &str, duration: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        trace!("cache hit {} in {:?}", key, duration);
    }

    fn record_miss(&self, key: &str, duration: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!("cache miss {} in {:?}", key, duration);
    }

    fn record_error(&self, key: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        warn!("cache error on {}: {}", key, error);
    }

    fn record_invalidation(&self, tag: &str) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        trace!("cache tag {} invalidated", tag);
    }
}

/// How long computed listings stay in the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Keep entries until their tags are invalidated.
    #[default]
    Default,
    Fixed(Duration),
}

impl TtlPolicy {
    pub fn get_ttl(&self) -> Option<Duration> {
        match self {
            TtlPolicy::Default => None,
            TtlPolicy::Fixed(ttl) => Some(*ttl),
        }
    }
}

impl From<Option<Duration>> for TtlPolicy {
    fn from(ttl: Option<Duration>) -> Self {
        ttl.map_or(TtlPolicy::Default, TtlPolicy::Fixed)
    }
}
