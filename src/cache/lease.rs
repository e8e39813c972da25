// Scoped borrows: release runs on every exit path
use super::cache_error::CacheError;
use super::cache_key::CacheKey;
use super::handle_factory::HandleFactory;
use super::resource_cache::ResourceCache;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

/// A borrowed handle that is released when dropped.
///
/// Dropping covers early returns, panics and cancelled futures. Use
/// [`Lease::release`] to observe release errors instead of only logging them.
pub struct Lease<F: HandleFactory> {
    cache: ResourceCache<F>,
    key: CacheKey,
    handle: Arc<F::Handle>,
    released: bool,
}

impl<F: HandleFactory> Lease<F> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn handle(&self) -> &Arc<F::Handle> {
        &self.handle
    }

    pub fn release(mut self) -> Result<(), CacheError> {
        self.released = true;
        self.cache.release(&self.key, &self.handle)
    }
}

impl<F: HandleFactory> Deref for Lease<F> {
    type Target = F::Handle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<F: HandleFactory> Drop for Lease<F> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.cache.release(&self.key, &self.handle) {
            log::error!("Release on drop failed for {}: {}", self.key, e);
        }
    }
}

impl<F: HandleFactory> ResourceCache<F> {
    pub async fn lease(&self, key: &CacheKey) -> Result<Lease<F>, CacheError> {
        let handle = self.acquire(key).await?;
        Ok(Lease {
            cache: self.clone(),
            key: key.clone(),
            handle,
            released: false,
        })
    }

    /// Runs `code` with a borrowed handle and releases it afterwards.
    ///
    /// The result of `code` is passed through. When `code` fails, a release
    /// failure is logged and the original error is returned. `code` must not
    /// keep the handle after it completes.
    pub async fn with_handle<T, E, C, Fut>(&self, key: &CacheKey, code: C) -> Result<T, E>
    where
        C: FnOnce(Arc<F::Handle>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CacheError>,
    {
        let lease = self.lease(key).await?;
        let outcome = code(Arc::clone(lease.handle())).await;
        match outcome {
            Ok(value) => {
                lease.release()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(release_error) = lease.release() {
                    log::error!("Release failed after error for {}: {}", key, release_error);
                }
                Err(error)
            }
        }
    }
}
