//! Cache store capability.
//!
//! Both the fast in-process tier and any durable tier implement
//! [`CacheStore`]. The orchestrator only ever needs these five operations.

use std::sync::Arc;

use async_trait::async_trait;
use staleview_core::{CacheKey, CacheRecord, StaleviewResult};

/// Key-addressed record storage.
///
/// Implementations must be safe to share between tasks. A durable store may be
/// shared by many orchestrators at once and is responsible for its own
/// internal synchronization.
///
/// # Semantics
///
/// - `set` overwrites whatever record currently occupies `record.key()`.
/// - `clear` of an absent key is a no-op.
/// - `clear_all` empties this store only; other tiers are untouched.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Check whether a record exists for `key`.
    ///
    /// Backends should answer this without decoding the payload.
    async fn exists(&self, key: &CacheKey) -> StaleviewResult<bool>;

    /// Get the record stored at `key`, if any.
    async fn get(&self, key: &CacheKey) -> StaleviewResult<Option<CacheRecord>>;

    /// Store `record` at its key, replacing any previous record.
    async fn set(&self, record: CacheRecord) -> StaleviewResult<()>;

    /// Remove the record at `key` if present.
    async fn clear(&self, key: &CacheKey) -> StaleviewResult<()>;

    /// Remove every record in this store.
    async fn clear_all(&self) -> StaleviewResult<()>;
}

#[async_trait]
impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    async fn exists(&self, key: &CacheKey) -> StaleviewResult<bool> {
        (**self).exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> StaleviewResult<Option<CacheRecord>> {
        (**self).get(key).await
    }

    async fn set(&self, record: CacheRecord) -> StaleviewResult<()> {
        (**self).set(record).await
    }

    async fn clear(&self, key: &CacheKey) -> StaleviewResult<()> {
        (**self).clear(key).await
    }

    async fn clear_all(&self) -> StaleviewResult<()> {
        (**self).clear_all().await
    }
}
