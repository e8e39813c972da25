pub mod cache_error;
pub mod cache_key;
pub mod handle_factory;
pub mod lease;
pub mod resource_cache;

pub use cache_error::{CacheError, CloseFailure, CloseReport};
pub use cache_key::CacheKey;
pub use handle_factory::{FactoryError, HandleFactory};
pub use lease::Lease;
pub use resource_cache::{ResourceCache, DEFAULT_KEEP_ALIVE};

#[cfg(test)]
mod test_resource_cache;
