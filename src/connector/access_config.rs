// Per-call access settings applied to borrowed views
use super::connector_config::ConnectorConfig;
use super::views::Database;
use crate::cache::CacheKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadConcern {
    Local,
    Available,
    Majority,
    Linearizable,
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Acknowledgment {
    Nodes(u32),
    Majority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriteConcern {
    pub w: Option<Acknowledgment>,
    pub journal: Option<bool>,
    pub w_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReadSettings {
    pub read_preference: ReadPreference,
    pub read_concern: Option<ReadConcern>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriteSettings {
    pub write_concern: WriteConcern,
}

/// What a call intends to do with its view. Each variant knows how to
/// configure a freshly derived [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AccessMode {
    Read(ReadSettings),
    Write(WriteSettings),
}

impl AccessMode {
    pub fn apply(&self, database: Database) -> Database {
        match self {
            AccessMode::Read(settings) => {
                let database = database.with_read_preference(settings.read_preference);
                match settings.read_concern {
                    Some(concern) => database.with_read_concern(concern),
                    None => database,
                }
            }
            AccessMode::Write(settings) => database.with_write_concern(settings.write_concern),
        }
    }
}

/// Target namespace plus access settings for one facade call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(default)]
    pub address: Option<String>,
    pub database: String,
    pub collection: String,
    pub mode: AccessMode,
}

impl AccessConfig {
    pub fn read(database: &str, collection: &str) -> Self {
        Self {
            address: None,
            database: database.to_string(),
            collection: collection.to_string(),
            mode: AccessMode::Read(ReadSettings::default()),
        }
    }

    pub fn write(database: &str, collection: &str) -> Self {
        Self {
            mode: AccessMode::Write(WriteSettings::default()),
            ..Self::read(database, collection)
        }
    }

    /// Namespace from the connector configuration, default address.
    pub fn from_connector(config: &ConnectorConfig, mode: AccessMode) -> Self {
        Self {
            mode,
            ..Self::read(&config.database, &config.collection)
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from(self.address.as_deref())
    }
}
