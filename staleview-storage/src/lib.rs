//! staleview Storage - Cache Tiers and Codec
//!
//! Defines the [`CacheStore`] capability shared by both cache tiers, the
//! in-process [`MemoryCacheStore`] fast tier, the LMDB-backed
//! [`LmdbCacheStore`] durable tier, and the [`JsonCodec`] that turns domain
//! values into record payloads.

pub mod codec;
pub mod config;
pub mod lmdb_backend;
pub mod memory;
pub mod store;

pub use codec::JsonCodec;
pub use config::StoreConfig;
pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use memory::MemoryCacheStore;
pub use store::CacheStore;
