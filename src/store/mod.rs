//! Backing-store clients.
//!
//! The transport only needs list semantics: push to the head, read a
//! bounded window from the head, remove one exact value, and close.

pub mod config;
pub mod memory;
pub mod pool;

use async_trait::async_trait;

use crate::errors::StoreError;

pub use config::{RetentionPolicy, StoreConfig, StoreLocation, TransportAddress};
pub use memory::MemoryStore;
pub use pool::RedisStore;

/// List-oriented key-value store holding persisted subscriber records.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Prepends `value` to the list under `key`.
    async fn push(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Returns at most `limit` values from the head of the list (most recent first).
    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Removes the first occurrence of `value`; returns how many were removed.
    async fn remove(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    /// Releases the client. Further calls fail with [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}
