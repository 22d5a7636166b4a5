//! Fixed-capacity, insertion-ordered key/value storage.
//!
//! Both the dedup index (`fingerprint -> correlation id`) and the outcome cache
//! (`correlation id -> outcome`) are instances of [`BoundedStore`]. A store never holds more
//! than its configured capacity: inserting a key that is not yet present while the store is
//! full first evicts the single oldest surviving entry. Age is fixed at first insertion, so
//! overwriting an existing key neither refreshes it nor evicts anything.
//!
//! Two backends implement the contract:
//!
//! - [`MemoryStore`] keeps entries in process behind a mutex.
//! - [`PostgresStore`] keeps entries in a shared table so several gateway instances can
//!   cooperate; every mutating call is one transaction serialized per namespace.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::{PostgresStore, connect_pool, ensure_schema};

/// Errors raised by a storage backend.
///
/// The in-memory backend never fails; these surface only from shared stores and are
/// propagated to the caller of the registry operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected or could not serve the request.
    #[error("Database request failed: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored value could not be converted to or from JSON.
    #[error("Failed to encode stored value: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Insertion-ordered map with FIFO eviction at a fixed capacity.
#[async_trait]
pub trait BoundedStore<V>: Send + Sync
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Maximum number of entries retained.
    fn capacity(&self) -> usize;

    /// Insert or overwrite `key`.
    async fn put(&self, key: &str, value: V) -> Result<(), StoreError>;

    /// Insert `key` only when it is absent, as one atomic step.
    ///
    /// Returns the value already stored under `key` when present, in which case nothing is
    /// written. Returns `None` after a successful insert.
    async fn put_if_absent(&self, key: &str, value: V) -> Result<Option<V>, StoreError>;

    /// Look up `key` without touching its age.
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError>;

    /// Whether any key currently maps to `value`.
    async fn contains_value(&self, value: &V) -> Result<bool, StoreError> {
        Ok(!self.keys_with_value(value).await?.is_empty())
    }

    /// Keys currently mapping to `value`, oldest first.
    async fn keys_with_value(&self, value: &V) -> Result<Vec<String>, StoreError>;

    /// Number of entries currently held.
    async fn len(&self) -> Result<usize, StoreError>;

    /// Whether the store holds no entries.
    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}
