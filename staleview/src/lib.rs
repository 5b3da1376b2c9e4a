//! staleview - Cache-then-Refresh Orchestration
//!
//! Show the last known value immediately, then fetch a fresh one when the
//! cached copy is stale, missing, or rejected. Fresh results are written back
//! to a fast in-process tier and an optional durable LMDB tier.
//!
//! ```ignore
//! use staleview::{fetch_fn, CacheOrchestrator};
//!
//! let orchestrator = CacheOrchestrator::<Profile>::new()
//!     .for_request(fetch_fn(|| async { load_profile().await }))
//!     .on_data(|profile, from_cache| println!("{profile:?} cached={from_cache}"))
//!     .on_error(|e| eprintln!("refresh failed: {e}"));
//!
//! orchestrator.start_with_cache().await?.wait().await;
//! ```

pub mod handlers;
pub mod orchestrator;
pub mod refresh;
pub mod source;

pub use handlers::{DataHandler, ErrorHandler, Handlers, SignalHandler, Validator};
pub use orchestrator::CacheOrchestrator;
pub use refresh::{Refresh, Settlement};
pub use source::{fetch_fn, FetchSource, FnSource};

pub use staleview_core::{
    CacheKey, CacheRecord, Cacheable, CodecError, ConfigError, FetchError, StaleviewError,
    StaleviewResult, StorageError, Timestamp,
};
pub use staleview_storage::{
    CacheStore, JsonCodec, LmdbCacheError, LmdbCacheStore, MemoryCacheStore, StoreConfig,
};
