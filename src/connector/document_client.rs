// HTTP document-store client handle and the factory that builds it
use super::connector_config::ConnectorConfig;
use crate::cache::handle_factory::{FactoryError, HandleFactory};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Failures of the HTTP driver, handed to the cache as [`FactoryError::Driver`].
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint {0} answered ping with {1}")]
    Unreachable(String, StatusCode),

    #[error("Invalid URL {0}: {1}")]
    InvalidUrl(String, String),
}

impl From<ClientError> for FactoryError {
    fn from(e: ClientError) -> Self {
        FactoryError::Driver(Box::new(e))
    }
}

/// A pooled HTTP client bound to one document-store endpoint.
///
/// `reqwest::Client` multiplexes its own connection pool, so one instance is
/// shared by every borrower of a cache key.
#[derive(Debug)]
pub struct DocumentClient {
    http: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
    closed: AtomicBool,
}

impl DocumentClient {
    pub fn new(http: reqwest::Client, base_url: Url, auth_token: Option<String>) -> Self {
        Self {
            http,
            base_url,
            auth_token,
            closed: AtomicBool::new(false),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the client unusable. Returns false if it was already closed.
    fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// GET `<base>/ping`, success on 200.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let url = self
            .base_url
            .join("ping")
            .map_err(|e| ClientError::InvalidUrl(self.base_url.to_string(), e.to_string()))?;

        let mut req = self.http.get(url);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let start = std::time::Instant::now();
        let resp = req.send().await?;
        let status = resp.status();
        log::debug!(
            "Ping [{}] took: {:.4}s",
            self.base_url,
            start.elapsed().as_secs_f64()
        );

        match status {
            StatusCode::OK => Ok(()),
            _ => Err(ClientError::Unreachable(self.base_url.to_string(), status)),
        }
    }
}

/// Builds a [`DocumentClient`] per address, falling back to the configured URI.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    config: ConnectorConfig,
}

impl HttpClientFactory {
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }
}

// Url::join drops the last path segment unless the base ends with '/'
fn parse_base_url(address: &str) -> Result<Url, FactoryError> {
    let mut url = Url::parse(address)
        .map_err(|e| FactoryError::InvalidAddress(address.to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(FactoryError::InvalidAddress(
            address.to_string(),
            "not a base URL".to_string(),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait]
impl HandleFactory for HttpClientFactory {
    type Handle = DocumentClient;

    async fn create(&self, address: Option<&str>) -> Result<DocumentClient, FactoryError> {
        let address = address.unwrap_or(&self.config.uri);
        let base_url = parse_base_url(address)?;

        let http = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_millis(self.config.connect_timeout_ms))
            .timeout(Duration::from_millis(self.config.request_timeout_ms))
            .build()
            .map_err(ClientError::from)?;
        let client = DocumentClient::new(http, base_url, self.config.auth_token.clone());

        if self.config.ping_on_connect {
            client.ping().await?;
        }
        log::info!("Connected document client to {}", client.base_url());
        Ok(client)
    }

    fn is_valid(&self, handle: &DocumentClient) -> bool {
        !handle.is_closed()
    }

    fn close(&self, handle: &DocumentClient) -> Result<(), FactoryError> {
        if !handle.mark_closed() {
            return Err(FactoryError::AlreadyClosed);
        }
        log::info!("Closed document client for {}", handle.base_url());
        Ok(())
    }
}
