//! staleview Core - Data Types
//!
//! Pure data structures shared by the storage tiers and the orchestrator.
//! This crate performs no I/O.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

pub mod error;
pub mod key;
pub mod record;

pub use error::{
    CodecError, ConfigError, FetchError, StaleviewError, StaleviewResult, StorageError,
};
pub use key::CacheKey;
pub use record::CacheRecord;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Marker trait for domain values that can be cached.
///
/// # Implementation Requirements
///
/// - `type_tag()` must return the same string for every build of the program.
///   It becomes the default [`CacheKey`] and may be persisted in a durable
///   store, so it must not depend on compiler-generated type names.
/// - Two different types should use different tags. Callers who keep several
///   independent caches of the same type must give each an explicit key.
/// - Implementations must be `Clone`, `Serialize`, and `DeserializeOwned` for
///   cache storage, and `Send + Sync + 'static` for async compatibility.
pub trait Cacheable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable identifier for this type.
    fn type_tag() -> &'static str;
}
