//! In-process fast tier.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use staleview_core::{CacheKey, CacheRecord, StaleviewResult, StorageError};

use crate::store::CacheStore;

/// Unbounded key to record map with no eviction.
///
/// Each orchestrator owns one of these so repeated reads within a process do
/// not go back to a slower durable tier, and so caching works at all when no
/// durable tier is configured.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    records: RwLock<HashMap<CacheKey, CacheRecord>>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> StaleviewResult<usize> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.len())
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> StaleviewResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn exists(&self, key: &CacheKey) -> StaleviewResult<bool> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.contains_key(key))
    }

    async fn get(&self, key: &CacheKey) -> StaleviewResult<Option<CacheRecord>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn set(&self, record: CacheRecord) -> StaleviewResult<()> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        records.insert(record.key().clone(), record);
        Ok(())
    }

    async fn clear(&self, key: &CacheKey) -> StaleviewResult<()> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        records.remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> StaleviewResult<()> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        records.clear();
        Ok(())
    }
}
