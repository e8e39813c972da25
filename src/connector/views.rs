// Database and collection views derived from a borrowed client
use super::access_config::{ReadConcern, ReadPreference, WriteConcern};
use super::document_client::DocumentClient;
use reqwest::Url;
use std::sync::Arc;

/// A database on a borrowed client, with its own read and write settings.
///
/// Views are cheap to build and never modify the shared client, so callers
/// with different settings can use the same handle at once.
#[derive(Debug, Clone)]
pub struct Database {
    client: Arc<DocumentClient>,
    name: String,
    read_preference: ReadPreference,
    read_concern: Option<ReadConcern>,
    write_concern: WriteConcern,
}

impl Database {
    pub fn new(client: Arc<DocumentClient>, name: &str) -> Self {
        Self {
            client,
            name: name.to_string(),
            read_preference: ReadPreference::default(),
            read_concern: None,
            write_concern: WriteConcern::default(),
        }
    }

    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = read_preference;
        self
    }

    pub fn with_read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.read_concern = Some(read_concern);
        self
    }

    pub fn with_write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = write_concern;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Arc<DocumentClient> {
        &self.client
    }

    pub fn read_preference(&self) -> ReadPreference {
        self.read_preference
    }

    pub fn read_concern(&self) -> Option<ReadConcern> {
        self.read_concern
    }

    pub fn write_concern(&self) -> WriteConcern {
        self.write_concern
    }

    /// `<base>/<database>/`, or `None` if the name is not a valid path segment.
    pub fn endpoint(&self) -> Option<Url> {
        self.client.base_url().join(&format!("{}/", self.name)).ok()
    }

    /// The collection inherits this database's settings.
    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            database: self.clone(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Collection {
    database: Database,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// `database.collection`
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database.name, self.name)
    }

    pub fn endpoint(&self) -> Option<Url> {
        self.database.endpoint()?.join(&self.name).ok()
    }
}
