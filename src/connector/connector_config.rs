// Connector configuration: JSON file plus environment overrides
use crate::cache::DEFAULT_KEEP_ALIVE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_URI: &str = "CONNECTOR_URI";
pub const ENV_KEEP_ALIVE_MS: &str = "CONNECTOR_KEEP_ALIVE_MS";
pub const ENV_PING_ON_CONNECT: &str = "CONNECTOR_PING_ON_CONNECT";

const DEFAULT_URI: &str = "http://localhost:27080/";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectorConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub keep_alive_ms: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub ping_on_connect: bool,
    pub auth_token: Option<String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: "test".to_string(),
            collection: "test".to_string(),
            keep_alive_ms: DEFAULT_KEEP_ALIVE.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            ping_on_connect: false,
            auth_token: None,
        }
    }
}

impl ConnectorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides<L>(mut self, lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(ENV_URI) {
            self.uri = uri;
        }
        if let Some(raw) = lookup(ENV_KEEP_ALIVE_MS) {
            self.keep_alive_ms = parse_var(ENV_KEEP_ALIVE_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PING_ON_CONNECT) {
            self.ping_on_connect = parse_var(ENV_PING_ON_CONNECT, &raw)?;
        }
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw.to_string()))
}
