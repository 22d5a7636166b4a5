//! In-process bounded store.

use super::{BoundedStore, StoreError};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Bounded FIFO map held in process memory.
///
/// Reads and writes (including the eviction performed by inserts) go through one mutex, so
/// `put_if_absent` is atomic with respect to every other call on the same store.
pub struct MemoryStore<V> {
    capacity: NonZeroUsize,
    entries: Mutex<IndexMap<String, V>>,
}

impl<V> MemoryStore<V> {
    /// Create an empty store holding at most `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(IndexMap::with_capacity(capacity.get())),
        }
    }

    /// Keys in insertion order, oldest first.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    fn insert_new(&self, entries: &mut IndexMap<String, V>, key: &str, value: V) {
        if entries.len() >= self.capacity.get() {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                tracing::debug!(key = %evicted, capacity = self.capacity.get(), "Evicted oldest entry");
            }
        }
        entries.insert(key.to_string(), value);
    }
}

#[async_trait]
impl<V> BoundedStore<V> for MemoryStore<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn capacity(&self) -> usize {
        self.capacity.get()
    }

    async fn put(&self, key: &str, value: V) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(slot) => *slot = value,
            None => self.insert_new(&mut entries, key, value),
        }
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: V) -> Result<Option<V>, StoreError> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            return Ok(Some(existing.clone()));
        }
        self.insert_new(&mut entries, key, value);
        Ok(None)
    }

    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn contains_value(&self, value: &V) -> Result<bool, StoreError> {
        Ok(self.entries.lock().values().any(|stored| stored == value))
    }

    async fn keys_with_value(&self, value: &V) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(_, stored)| *stored == value)
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.lock().len())
    }
}
