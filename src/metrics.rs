//! Sync counters.
//!
//! One `SyncMetrics` is shared (via `Arc`) between the detector and the
//! resolver of a process and reported on `/metrics`.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// Resolutions answered from a stored Translation Entry
    cache_hits: AtomicUsize,

    /// Resolutions that had to go to the provider
    cache_misses: AtomicUsize,

    /// Calls made to the translation provider
    provider_calls: AtomicUsize,

    /// Provider calls that failed
    provider_failures: AtomicUsize,

    /// Comment versions minted by the detector
    versions_created: AtomicUsize,

    /// Detections that found the text unchanged
    versions_unchanged: AtomicUsize,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_call(&self) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_failure(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_version_created(&self) {
        self.versions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unchanged(&self) {
        self.versions_unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> usize {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn provider_calls(&self) -> usize {
        self.provider_calls.load(Ordering::Relaxed)
    }

    pub fn provider_failures(&self) -> usize {
        self.provider_failures.load(Ordering::Relaxed)
    }

    pub fn versions_created(&self) -> usize {
        self.versions_created.load(Ordering::Relaxed)
    }

    pub fn versions_unchanged(&self) -> usize {
        self.versions_unchanged.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters
    pub fn report(&self) -> MetricsReport {
        let hits = self.cache_hits();
        let misses = self.cache_misses();
        let total = hits + misses;
        let cache_hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate,
            provider_calls: self.provider_calls(),
            provider_failures: self.provider_failures(),
            versions_created: self.versions_created(),
            versions_unchanged: self.versions_unchanged(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Percentage (0-100)
    pub cache_hit_rate: f64,
    pub provider_calls: usize,
    pub provider_failures: usize,
    pub versions_created: usize,
    pub versions_unchanged: usize,
}
