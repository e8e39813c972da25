//! Keyed, reference-counted cache of document-store clients.
//!
//! [`cache::ResourceCache`] shares one lazily created handle per address
//! between concurrent borrowers and closes it once it has been idle for the
//! keep-alive. [`connector::Connector`] wraps the cache with scoped helpers
//! that hand out client, database and collection views.
pub mod cache;
pub mod connector;
pub mod metrics;
