// HandleFactory trait: the cache's only view of the database driver
use async_trait::async_trait;

#[derive(thiserror::Error, Debug)]
pub enum FactoryError {
    #[error("Invalid address {0}: {1}")]
    InvalidAddress(String, String),

    // whatever the driver reports, kept as the source
    #[error("Driver error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Handle already closed")]
    AlreadyClosed,

    #[error("{0}")]
    Other(String),
}

/// Produces, validates and closes handles for the cache.
///
/// Handles are shared by every concurrent borrower of a key, so they must be
/// safe for concurrent use (a pooled or multiplexed client, not a single connection).
#[async_trait]
pub trait HandleFactory: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    async fn create(&self, address: Option<&str>) -> Result<Self::Handle, FactoryError>;

    /// Called while the entry is locked; must be cheap and must not block.
    fn is_valid(&self, _handle: &Self::Handle) -> bool {
        true
    }

    fn close(&self, handle: &Self::Handle) -> Result<(), FactoryError>;
}
