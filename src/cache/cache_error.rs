use super::cache_key::CacheKey;
use super::handle_factory::FactoryError;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("Resource cache is closed")]
    CacheClosed,

    #[error("Handle factory error: {0}")]
    Factory(#[from] FactoryError),

    // a borrow was released more often than it was acquired
    #[error("Unbalanced release for key {0}")]
    UnbalancedRelease(CacheKey),
}

/// A handle that could not be closed during reap or shutdown.
#[derive(thiserror::Error, Debug)]
#[error("Failed to close handle for {key}: {source}")]
pub struct CloseFailure {
    pub key: CacheKey,
    #[source]
    pub source: FactoryError,
}

/// Outcome of a reap pass or a shutdown drain.
#[derive(Debug, Default)]
pub struct CloseReport {
    pub closed: usize,
    pub failures: Vec<CloseFailure>,
}

impl CloseReport {
    pub(crate) fn record(&mut self, outcome: Result<(), CloseFailure>) {
        match outcome {
            Ok(()) => self.closed += 1,
            Err(failure) => self.failures.push(failure),
        }
    }

    /// Entries removed from the cache, whether or not their close succeeded.
    pub fn evicted(&self) -> usize {
        self.closed + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
