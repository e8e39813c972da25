// Counters for cache lifecycle events
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheStats {
    created: AtomicU64,
    reused: AtomicU64,
    released: AtomicU64,
    evicted: AtomicU64,
    closed: AtomicU64,
    close_failures: AtomicU64,
    stale_discarded: AtomicU64,
    unbalanced_releases: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`], serializable for logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub created: u64,
    pub reused: u64,
    pub released: u64,
    pub evicted: u64,
    pub closed: u64,
    #[serde(rename = "closeFailures")]
    pub close_failures: u64,
    #[serde(rename = "staleDiscarded")]
    pub stale_discarded: u64,
    #[serde(rename = "unbalancedReleases")]
    pub unbalanced_releases: u64,
}

impl CacheStats {
    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reused(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_close_failure(&self) {
        self.close_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_discarded(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unbalanced_release(&self) {
        self.unbalanced_releases.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            close_failures: self.close_failures.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            unbalanced_releases: self.unbalanced_releases.load(Ordering::Relaxed),
        }
    }
}
