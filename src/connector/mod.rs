pub mod access_config;
pub mod connector_config;
pub mod document_client;
pub mod facade;
pub mod views;

pub use access_config::{AccessConfig, AccessMode};
pub use connector_config::{ConfigError, ConnectorConfig};
pub use document_client::{ClientError, DocumentClient, HttpClientFactory};
pub use facade::Connector;
pub use views::{Collection, Database};
