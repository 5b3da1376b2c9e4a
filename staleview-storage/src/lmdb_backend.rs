//! LMDB-backed durable tier.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts.
//!
//! # Value Format
//!
//! Each value is `[valid_until millis: i64 LE, 8 bytes][payload: UTF-8]`.
//!
//! # Keys
//!
//! LMDB rejects keys longer than 511 bytes. Longer cache keys are stored
//! under a `0xFF` marker byte followed by their SHA-256 digest. The marker
//! never occurs in UTF-8, so a digest slot cannot collide with a plain key.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions, so one backend may be shared by any
//! number of orchestrators:
//! - Read transactions for `exists` and `get`
//! - Write transactions for `set`, `clear`, and `clear_all`

use std::borrow::Cow;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use sha2::{Digest, Sha256};
use staleview_core::{
    CacheKey, CacheRecord, StaleviewError, StaleviewResult, StorageError,
};

use crate::config::StoreConfig;
use crate::store::CacheStore;

/// Maximum key size accepted by LMDB with default build options.
const MAX_KEY_BYTES: usize = 511;

/// Size of the deadline header in front of each payload.
const HEADER_BYTES: usize = 8;

/// Leading byte of hashed keys; invalid anywhere in UTF-8.
const HASHED_KEY_MARKER: u8 = 0xFF;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Failure inside the LMDB backend.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    #[error("Cannot open LMDB environment: {0}")]
    EnvOpen(String),

    #[error("LMDB map of {0} MB does not fit in memory addresses")]
    InvalidMapSize(usize),

    #[error("Cannot open LMDB database: {0}")]
    DbOpen(String),

    #[error("LMDB transaction failed: {0}")]
    Transaction(String),

    #[error("Cache directory I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for StaleviewError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Io(io) => StorageError::Io {
                reason: io.to_string(),
            }
            .into(),
            other => StorageError::Backend {
                reason: other.to_string(),
            }
            .into(),
        }
    }
}

/// LMDB-backed durable cache store.
///
/// # Example
///
/// ```ignore
/// use staleview_storage::{LmdbCacheStore, StoreConfig};
///
/// let store = LmdbCacheStore::open(&StoreConfig::from_env())?;
/// let orchestrator = CacheOrchestrator::<Profile>::with_durable(Arc::new(store));
/// ```
pub struct LmdbCacheStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbCacheStore {
    /// Create a new LMDB cache store.
    ///
    /// `path` is created if missing; `max_size_mb` bounds the memory map.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        let map_size = max_size_mb
            .checked_mul(BYTES_PER_MB)
            .ok_or(LmdbCacheError::InvalidMapSize(max_size_mb))?;
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process;
        // callers share the resulting store instead of reopening the directory.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "Opened LMDB cache store");

        Ok(Self { env, db })
    }

    /// Validate `config` and open the store it describes.
    pub fn open(config: &StoreConfig) -> StaleviewResult<Self> {
        config.validate()?;
        Ok(Self::new(&config.path, config.max_size_mb)?)
    }

    /// Number of records currently stored.
    pub fn entry_count(&self) -> StaleviewResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        Ok(self.db.len(&rtxn).map_err(txn_error)?)
    }

    /// Run `op` in a write transaction and commit it.
    fn write<F>(&self, op: F) -> StaleviewResult<()>
    where
        F: FnOnce(&mut RwTxn<'_>) -> heed::Result<()>,
    {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        op(&mut wtxn).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    /// Encode a cache key into the bytes used inside LMDB.
    fn encode_key(key: &CacheKey) -> Cow<'_, [u8]> {
        let raw = key.as_bytes();
        if raw.len() <= MAX_KEY_BYTES {
            Cow::Borrowed(raw)
        } else {
            let mut hashed = Vec::with_capacity(1 + 32);
            hashed.push(HASHED_KEY_MARKER);
            hashed.extend_from_slice(&Sha256::digest(raw));
            Cow::Owned(hashed)
        }
    }

    /// Encode a record value: deadline header followed by the payload.
    fn encode_value(record: &CacheRecord) -> Vec<u8> {
        let payload = record.payload().as_bytes();
        let mut bytes = Vec::with_capacity(HEADER_BYTES + payload.len());
        bytes.extend_from_slice(&record.valid_until().timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    /// Decode a stored value back into a record.
    fn decode_value(key: &CacheKey, bytes: &[u8]) -> StaleviewResult<CacheRecord> {
        let corrupt = |reason: &str| StorageError::CorruptRecord {
            key: key.clone(),
            reason: reason.to_string(),
        };

        let header: [u8; HEADER_BYTES] = bytes
            .get(..HEADER_BYTES)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| corrupt("value shorter than deadline header"))?;
        let valid_until = DateTime::<Utc>::from_timestamp_millis(i64::from_le_bytes(header))
            .ok_or_else(|| corrupt("deadline out of range"))?;
        let payload = std::str::from_utf8(&bytes[HEADER_BYTES..])
            .map_err(|_| corrupt("payload is not valid UTF-8"))?;

        Ok(CacheRecord::new(key.clone(), payload, valid_until))
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn exists(&self, key: &CacheKey) -> StaleviewResult<bool> {
        let encoded_key = Self::encode_key(key);
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let raw = self.db.get(&rtxn, &*encoded_key).map_err(txn_error)?;
        Ok(raw.is_some())
    }

    async fn get(&self, key: &CacheKey) -> StaleviewResult<Option<CacheRecord>> {
        let encoded_key = Self::encode_key(key);
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        match self.db.get(&rtxn, &*encoded_key).map_err(txn_error)? {
            Some(bytes) => Self::decode_value(key, bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn set(&self, record: CacheRecord) -> StaleviewResult<()> {
        let encoded_key = Self::encode_key(record.key());
        let value = Self::encode_value(&record);
        self.write(|wtxn| self.db.put(wtxn, &*encoded_key, &value))
    }

    async fn clear(&self, key: &CacheKey) -> StaleviewResult<()> {
        let encoded_key = Self::encode_key(key);
        self.write(|wtxn| self.db.delete(wtxn, &*encoded_key).map(|_| ()))
    }

    async fn clear_all(&self) -> StaleviewResult<()> {
        self.write(|wtxn| self.db.clear(wtxn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbCacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbCacheStore::new(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    fn record(key: &str, payload: &str) -> CacheRecord {
        CacheRecord::expiring(key, payload, Utc::now(), Some(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _temp_dir) = create_test_store();
        let original = record("profile", "{\"name\":\"ada\"}");

        store.set(original.clone()).await.expect("set should succeed");

        let cached = store
            .get(&CacheKey::from("profile"))
            .await
            .expect("get should succeed")
            .expect("record should be present");
        assert_eq!(cached.key(), original.key());
        assert_eq!(cached.payload(), original.payload());
        // Deadlines survive at millisecond precision.
        assert_eq!(
            cached.valid_until().timestamp_millis(),
            original.valid_until().timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (store, _temp_dir) = create_test_store();
        let key = CacheKey::from("missing");
        assert!(store.get(&key).await.expect("get should succeed").is_none());
        assert!(!store.exists(&key).await.expect("exists should succeed"));
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (store, _temp_dir) = create_test_store();
        store.set(record("k", "old")).await.expect("set should succeed");
        store.set(record("k", "new")).await.expect("set should succeed");

        let cached = store
            .get(&CacheKey::from("k"))
            .await
            .expect("get should succeed")
            .expect("record should be present");
        assert_eq!(cached.payload(), "new");
        assert_eq!(store.entry_count().expect("count should succeed"), 1);
    }

    #[tokio::test]
    async fn test_clear_and_clear_all() {
        let (store, _temp_dir) = create_test_store();
        for key in ["a", "b", "c"] {
            store.set(record(key, "x")).await.expect("set should succeed");
        }

        store.clear(&CacheKey::from("a")).await.expect("clear should succeed");
        store.clear(&CacheKey::from("absent")).await.expect("clear should succeed");
        assert!(!store.exists(&CacheKey::from("a")).await.expect("exists should succeed"));
        assert!(store.exists(&CacheKey::from("b")).await.expect("exists should succeed"));

        store.clear_all().await.expect("clear_all should succeed");
        assert_eq!(store.entry_count().expect("count should succeed"), 0);
    }

    #[tokio::test]
    async fn test_long_keys_are_hashed() {
        let (store, _temp_dir) = create_test_store();
        let long_key = "k".repeat(2048);
        store.set(record(&long_key, "big")).await.expect("set should succeed");

        let key = CacheKey::from(long_key.as_str());
        let cached = store
            .get(&key)
            .await
            .expect("get should succeed")
            .expect("record should be present");
        // The record keeps its logical key even though LMDB stores a digest.
        assert_eq!(cached.key(), &key);
        assert!(LmdbCacheStore::encode_key(&key).len() <= MAX_KEY_BYTES);
    }

    #[tokio::test]
    async fn test_digest_shaped_key_keeps_its_own_slot() {
        let (store, _temp_dir) = create_test_store();
        let long_key = CacheKey::from("k".repeat(2048).as_str());
        let lookalike = CacheKey::new(format!(
            "sha256:{}",
            hex::encode(Sha256::digest(long_key.as_bytes()))
        ));

        store
            .set(record(long_key.as_str(), "long"))
            .await
            .expect("set should succeed");
        store
            .set(record(lookalike.as_str(), "short"))
            .await
            .expect("set should succeed");

        assert_ne!(
            LmdbCacheStore::encode_key(&long_key),
            LmdbCacheStore::encode_key(&lookalike)
        );
        let long = store
            .get(&long_key)
            .await
            .expect("get should succeed")
            .expect("record should be present");
        assert_eq!(long.payload(), "long");
        assert_eq!(store.entry_count().expect("count should succeed"), 2);
    }

    #[test]
    fn test_oversized_map_is_rejected() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let result = LmdbCacheStore::new(temp_dir.path(), usize::MAX / 2);
        assert!(matches!(result, Err(LmdbCacheError::InvalidMapSize(_))));
    }

    #[tokio::test]
    async fn test_corrupt_value_is_reported() {
        let (store, _temp_dir) = create_test_store();
        let key = CacheKey::from("broken");

        let mut wtxn = store.env.write_txn().expect("write txn should open");
        store
            .db
            .put(&mut wtxn, key.as_bytes(), &[1u8, 2, 3])
            .expect("raw put should succeed");
        wtxn.commit().expect("commit should succeed");

        assert!(store.exists(&key).await.expect("exists should succeed"));
        let err = store.get(&key).await.expect_err("corrupt value should fail");
        assert!(matches!(
            err,
            StaleviewError::Storage(StorageError::CorruptRecord { .. })
        ));
    }

    #[tokio::test]
    async fn test_shared_between_tasks() {
        let (store, _temp_dir) = create_test_store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .set(record(&format!("key-{i}"), "v"))
                    .await
                    .expect("set should succeed");
            }));
        }
        for handle in handles {
            handle.await.expect("task should not panic");
        }

        assert_eq!(store.entry_count().expect("count should succeed"), 8);
    }

    #[test]
    fn test_open_from_config() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StoreConfig::new()
            .with_path(temp_dir.path().join("nested"))
            .with_max_size_mb(4);
        let store = LmdbCacheStore::open(&config).expect("open should succeed");
        assert_eq!(store.entry_count().expect("count should succeed"), 0);

        let bad = StoreConfig::new().with_path(temp_dir.path()).with_max_size_mb(0);
        assert!(LmdbCacheStore::open(&bad).is_err());
    }
}
