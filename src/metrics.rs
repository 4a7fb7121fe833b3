use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tracks counters for asset loading and cache behavior
#[derive(Debug, Default)]
pub struct LoadMetrics {
    load_times: RwLock<HashMap<String, Duration>>,
    cache_hits: AtomicU64,
    loads_completed: AtomicU64,
    loads_failed: AtomicU64,
    loads_cancelled: AtomicU64,
}

impl LoadMetrics {
    /// Create a new instance of LoadMetrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the wall-clock time a load took, from task creation to finish
    pub fn record_load_time(&self, name: String, duration: Duration) {
        let mut load_times = self.load_times.write();
        load_times.insert(name, duration);
    }

    /// Record a request that was satisfied by a resident asset
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed load
    pub fn record_load(&self) {
        self.loads_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed load
    pub fn record_failure(&self) {
        self.loads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cancelled load
    pub fn record_cancellation(&self) {
        self.loads_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of requests satisfied without running a loader
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Number of loads that ran a loader to completion
    pub fn loads_completed(&self) -> u64 {
        self.loads_completed.load(Ordering::Relaxed)
    }

    /// Number of loads that ended in a task failure
    pub fn loads_failed(&self) -> u64 {
        self.loads_failed.load(Ordering::Relaxed)
    }

    /// Number of loads discarded by cancellation
    pub fn loads_cancelled(&self) -> u64 {
        self.loads_cancelled.load(Ordering::Relaxed)
    }

    /// Get the recorded load time for an asset
    pub fn load_time(&self, name: &str) -> Option<Duration> {
        self.load_times.read().get(name).cloned()
    }

    /// Get all recorded load times
    pub fn all_load_times(&self) -> HashMap<String, Duration> {
        self.load_times.read().clone()
    }
}

/// A thread-safe, cloneable wrapper around LoadMetrics
#[derive(Debug, Clone, Default)]
pub struct MetricsHandle(Arc<LoadMetrics>);

impl MetricsHandle {
    /// Create a new metrics handle
    pub fn new() -> Self {
        Self(Arc::new(LoadMetrics::new()))
    }

    /// Get a reference to the underlying metrics
    pub fn inner(&self) -> &LoadMetrics {
        &self.0
    }
}

impl std::ops::Deref for MetricsHandle {
    type Target = LoadMetrics;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
