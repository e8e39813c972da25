// Facade: borrow a client, database or collection for the duration of a call
use super::access_config::AccessConfig;
use super::connector_config::ConnectorConfig;
use super::document_client::{DocumentClient, HttpClientFactory};
use super::views::{Collection, Database};
use crate::cache::{CacheError, CacheKey, CloseReport, HandleFactory, ResourceCache};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct Connector<F = HttpClientFactory>
where
    F: HandleFactory<Handle = DocumentClient>,
{
    cache: ResourceCache<F>,
}

impl Connector<HttpClientFactory> {
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self::new(HttpClientFactory::new(config.clone()), config.keep_alive())
    }
}

impl<F> Connector<F>
where
    F: HandleFactory<Handle = DocumentClient>,
{
    pub fn new(factory: F, keep_alive: Duration) -> Self {
        Self {
            cache: ResourceCache::new(factory, keep_alive),
        }
    }

    pub fn cache(&self) -> &ResourceCache<F> {
        &self.cache
    }

    /// Runs `code` with the client for the configured default address.
    pub async fn with_client<T, E, C, Fut>(&self, code: C) -> Result<T, E>
    where
        C: FnOnce(Arc<DocumentClient>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CacheError>,
    {
        self.cache.with_handle(&CacheKey::Default, code).await
    }

    pub async fn with_client_at<T, E, C, Fut>(&self, address: &str, code: C) -> Result<T, E>
    where
        C: FnOnce(Arc<DocumentClient>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CacheError>,
    {
        self.cache.with_handle(&CacheKey::from(address), code).await
    }

    /// Runs `code` with a database view configured by `config.mode`.
    pub async fn with_database<T, E, C, Fut>(&self, config: &AccessConfig, code: C) -> Result<T, E>
    where
        C: FnOnce(Database) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CacheError>,
    {
        self.cache
            .with_handle(&config.cache_key(), |client| code(database_view(client, config)))
            .await
    }

    pub async fn with_collection<T, E, C, Fut>(&self, config: &AccessConfig, code: C) -> Result<T, E>
    where
        C: FnOnce(Collection) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CacheError>,
    {
        self.cache
            .with_handle(&config.cache_key(), |client| {
                code(database_view(client, config).collection(&config.collection))
            })
            .await
    }

    /// Closes every cached client. Later calls fail with `CacheClosed`.
    pub fn close(&self) -> CloseReport {
        self.cache.shutdown()
    }

    pub fn close_on_ctrl_c(&self) -> Option<JoinHandle<()>> {
        self.cache.close_on_ctrl_c()
    }
}

fn database_view(client: Arc<DocumentClient>, config: &AccessConfig) -> Database {
    config.mode.apply(Database::new(client, &config.database))
}
