// Reference-counted handle cache with idle reaping
use super::cache_error::{CacheError, CloseFailure, CloseReport};
use super::cache_key::CacheKey;
use super::handle_factory::HandleFactory;
use crate::metrics::cache_stats::{CacheStats, CacheStatsSnapshot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(10);
const MIN_REAP_INTERVAL: Duration = Duration::from_millis(5);
const MAX_REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Reaper period for a keep-alive. An idle handle is closed at most
/// `keep_alive + reap_interval(keep_alive)` after its last release.
pub fn reap_interval(keep_alive: Duration) -> Duration {
    (keep_alive / 4).clamp(MIN_REAP_INTERVAL, MAX_REAP_INTERVAL)
}

struct CacheEntry<H> {
    handle: Arc<H>,
    ref_count: usize,
    // only meaningful while ref_count == 0
    last_released_at: Option<Instant>,
}

impl<H> CacheEntry<H> {
    fn borrowed(handle: Arc<H>) -> Self {
        Self {
            handle,
            ref_count: 1,
            last_released_at: None,
        }
    }

    fn is_idle_expired(&self, now: Instant, keep_alive: Duration) -> bool {
        self.ref_count == 0
            && self
                .last_released_at
                .map_or(false, |at| now.saturating_duration_since(at) >= keep_alive)
    }
}

struct Inner<F: HandleFactory> {
    factory: F,
    entries: DashMap<CacheKey, CacheEntry<F::Handle>>,
    // serializes handle construction per key
    creating: DashMap<CacheKey, Arc<Mutex<()>>>,
    keep_alive: Duration,
    closed: AtomicBool,
    stats: CacheStats,
    stop_reaper: watch::Sender<bool>,
}

/// Keyed cache of lazily created, shared handles.
///
/// Clones share the same table. Entries live until they have been idle
/// (refcount 0) for `keep_alive`, after which the background reaper closes
/// them. The cache shuts down when [`ResourceCache::shutdown`] is called or
/// the last clone is dropped, closing every remaining handle once.
pub struct ResourceCache<F: HandleFactory> {
    inner: Arc<Inner<F>>,
}

impl<F: HandleFactory> Clone for ResourceCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: HandleFactory> ResourceCache<F> {
    /// Builds the cache and starts its reaper on the current tokio runtime.
    pub fn new(factory: F, keep_alive: Duration) -> Self {
        let (stop_reaper, stop_rx) = watch::channel(false);
        let inner = Arc::new(Inner {
            factory,
            entries: DashMap::new(),
            creating: DashMap::new(),
            keep_alive,
            closed: AtomicBool::new(false),
            stats: CacheStats::default(),
            stop_reaper,
        });

        let period = reap_interval(keep_alive);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(run_reaper(Arc::downgrade(&inner), period, stop_rx));
            }
            Err(_) => log::warn!("No tokio runtime, idle handles are only reaped by explicit reap()"),
        }
        log::info!(
            "Resource cache started: keep_alive={:?} reap_interval={:?}",
            keep_alive,
            period
        );
        Self { inner }
    }

    /// Borrows the handle for `key`, creating it on first use.
    ///
    /// Every successful call must be paired with exactly one [`release`](Self::release);
    /// prefer [`lease`](Self::lease) or [`with_handle`](Self::with_handle).
    pub async fn acquire(&self, key: &CacheKey) -> Result<Arc<F::Handle>, CacheError> {
        let inner = &self.inner;
        inner.ensure_open()?;
        if let Some(handle) = inner.reuse(key) {
            return Ok(handle);
        }

        let gate = inner.creating.entry(key.clone()).or_default().value().clone();
        let creating = gate.lock().await;

        // another caller may have built it while we waited
        inner.ensure_open()?;
        if let Some(handle) = inner.reuse(key) {
            return Ok(handle);
        }

        let handle = match inner.factory.create(key.address()).await {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                drop(creating);
                drop(gate);
                inner.forget_gate(key);
                return Err(e.into());
            }
        };
        inner
            .entries
            .insert(key.clone(), CacheEntry::borrowed(Arc::clone(&handle)));
        inner.stats.record_created();

        // shutdown may have drained the table while we were constructing
        if inner.closed.load(Ordering::SeqCst) {
            if let Some((key, entry)) = inner.entries.remove(key) {
                let _ = inner.close_entry(key, entry);
            }
            return Err(CacheError::CacheClosed);
        }
        log::debug!("Created handle for {}", key);
        Ok(handle)
    }

    /// Returns one borrow of `handle`. Releasing a handle whose entry was
    /// already evicted or replaced is a no-op.
    pub fn release(&self, key: &CacheKey, handle: &Arc<F::Handle>) -> Result<(), CacheError> {
        let inner = &self.inner;
        let Some(mut entry) = inner.entries.get_mut(key) else {
            log::debug!("Release for {} after eviction", key);
            return Ok(());
        };
        if !Arc::ptr_eq(&entry.handle, handle) {
            log::debug!("Release for replaced handle of {}", key);
            return Ok(());
        }
        if entry.ref_count == 0 {
            drop(entry);
            inner.stats.record_unbalanced_release();
            log::error!("Unbalanced release for {}", key);
            return Err(CacheError::UnbalancedRelease(key.clone()));
        }

        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            entry.last_released_at = Some(Instant::now());
        }
        inner.stats.record_released();
        Ok(())
    }

    /// Evicts and closes every entry idle for at least the keep-alive.
    pub fn reap(&self) -> CloseReport {
        self.inner.reap()
    }

    /// Closes every remaining handle, borrowed or not, and rejects further acquires.
    /// Calling it again returns an empty report.
    pub fn shutdown(&self) -> CloseReport {
        self.inner.shutdown()
    }

    /// Shuts the cache down when the process receives Ctrl-C.
    /// Abrupt termination still skips it. The listener ends once the cache closes.
    pub fn close_on_ctrl_c(&self) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No tokio runtime, Ctrl-C shutdown not registered");
            return None;
        };
        let inner = Arc::downgrade(&self.inner);
        let mut stop = self.inner.stop_reaper.subscribe();
        let listener = runtime.spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_err() {
                        log::warn!("Unable to listen for Ctrl-C, relying on explicit shutdown");
                        return;
                    }
                    if let Some(inner) = inner.upgrade() {
                        log::info!("Ctrl-C received, shutting down resource cache");
                        inner.shutdown();
                    }
                }
                // closed explicitly or dropped
                _ = stop.wait_for(|closed| *closed) => {
                    log::debug!("Ctrl-C listener stopped");
                }
            }
        });
        Some(listener)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn keep_alive(&self) -> Duration {
        self.inner.keep_alive
    }

    pub fn reap_interval(&self) -> Duration {
        reap_interval(self.inner.keep_alive)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.entries.contains_key(key)
    }

    pub fn ref_count(&self, key: &CacheKey) -> Option<usize> {
        self.inner.entries.get(key).map(|entry| entry.ref_count)
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn creation_gates(&self) -> usize {
        self.inner.creating.len()
    }
}

impl<F: HandleFactory> Inner<F> {
    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::CacheClosed);
        }
        Ok(())
    }

    // Borrowed handles are shared as is; idle ones are validated first.
    fn reuse(&self, key: &CacheKey) -> Option<Arc<F::Handle>> {
        let stale = match self.entries.entry(key.clone()) {
            Entry::Vacant(_) => return None,
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.ref_count > 0 || self.factory.is_valid(&entry.handle) {
                    entry.ref_count += 1;
                    entry.last_released_at = None;
                    self.stats.record_reused();
                    return Some(Arc::clone(&entry.handle));
                }
                occupied.remove()
            }
        };

        log::warn!("Discarding stale handle for {}", key);
        self.stats.record_stale_discarded();
        self.forget_gate(key);
        let _ = self.close_entry(key.clone(), stale);
        None
    }

    // Drops the creation gate of `key` unless an acquire still holds a clone of it.
    fn forget_gate(&self, key: &CacheKey) {
        self.creating
            .remove_if(key, |_, gate| Arc::strong_count(gate) == 1);
    }

    fn reap(&self) -> CloseReport {
        let now = Instant::now();
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| entry.is_idle_expired(now, self.keep_alive))
            .map(|entry| entry.key().clone())
            .collect();

        let mut report = CloseReport::default();
        for key in expired {
            // re-checked under the shard lock, an acquire may have won the race
            let removed = self
                .entries
                .remove_if(&key, |_, entry| entry.is_idle_expired(now, self.keep_alive));
            if let Some((key, entry)) = removed {
                log::debug!("Reaping idle handle for {}", key);
                self.stats.record_evicted();
                self.forget_gate(&key);
                report.record(self.close_entry(key, entry));
            }
        }
        if report.evicted() > 0 {
            log::info!(
                "Reaped {} idle handle(s), {} close failure(s)",
                report.evicted(),
                report.failures.len()
            );
        }
        report
    }

    fn shutdown(&self) -> CloseReport {
        if self.closed.swap(true, Ordering::SeqCst) {
            return CloseReport::default();
        }
        self.stop_reaper.send_replace(true);

        let keys: Vec<CacheKey> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        let mut report = CloseReport::default();
        for key in keys {
            if let Some((key, entry)) = self.entries.remove(&key) {
                report.record(self.close_entry(key, entry));
            }
        }
        self.creating.clear();

        log::info!(
            "Resource cache shut down: closed {} handle(s), {} close failure(s)",
            report.closed,
            report.failures.len()
        );
        report
    }

    // Must be called with no map guard held.
    fn close_entry(&self, key: CacheKey, entry: CacheEntry<F::Handle>) -> Result<(), CloseFailure> {
        if entry.ref_count > 0 {
            log::warn!(
                "Closing handle for {} with {} outstanding borrow(s)",
                key,
                entry.ref_count
            );
        }
        match self.factory.close(&entry.handle) {
            Ok(()) => {
                self.stats.record_closed();
                Ok(())
            }
            Err(source) => {
                self.stats.record_close_failure();
                log::error!("Failed to close handle for {}: {}", key, source);
                Err(CloseFailure { key, source })
            }
        }
    }
}

impl<F: HandleFactory> Drop for Inner<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_reaper<F: HandleFactory>(
    inner: Weak<Inner<F>>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            // fires on shutdown and when the cache is dropped
            _ = stop.changed() => break,
        }
        let Some(inner) = inner.upgrade() else { break };
        if inner.closed.load(Ordering::SeqCst) {
            break;
        }
        inner.reap();
    }
    log::debug!("Reaper stopped");
}
