use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global counters for the engine's mutable-state surface (§9). Initialized
/// once at process start alongside the Manager map and the cache store.
#[derive(Default)]
pub struct Metrics {
    builds_started: AtomicU64,
    builds_succeeded: AtomicU64,
    builds_failed: AtomicU64,
    builds_stalled: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    evictions: AtomicU64,
    bytes_freed: AtomicU64,
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub builds_started: u64,
    pub builds_succeeded: u64,
    pub builds_failed: u64,
    pub builds_stalled: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub bytes_freed: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_started(&self) {
        self.builds_started.fetch_add(1, Ordering::Relaxed);
    }
    pub fn build_succeeded(&self) {
        self.builds_succeeded.fetch_add(1, Ordering::Relaxed);
    }
    pub fn build_failed(&self) {
        self.builds_failed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn build_stalled(&self) {
        self.builds_stalled.fetch_add(1, Ordering::Relaxed);
    }
    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }
    pub fn eviction(&self, bytes: u64) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.bytes_freed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            builds_started: self.builds_started.load(Ordering::Relaxed),
            builds_succeeded: self.builds_succeeded.load(Ordering::Relaxed),
            builds_failed: self.builds_failed.load(Ordering::Relaxed),
            builds_stalled: self.builds_stalled.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes_freed: self.bytes_freed.load(Ordering::Relaxed),
        }
    }
}
