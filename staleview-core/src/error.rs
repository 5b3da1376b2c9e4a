//! Error types for staleview operations

use std::fmt::Display;
use thiserror::Error;

use crate::CacheKey;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache store lock poisoned")]
    LockPoisoned,

    #[error("Backend operation failed: {reason}")]
    Backend { reason: String },

    #[error("Corrupt record at {key}: {reason}")]
    CorruptRecord { key: CacheKey, reason: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

/// Payload serialization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode value: {reason}")]
    Encode { reason: String },

    #[error("Failed to decode payload: {reason}")]
    Decode { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {field}")]
    MissingRequired { field: String },

    #[error("Invalid {field} {value:?}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors produced by a fetch source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Fetch failed: {reason}")]
    Failed { reason: String },
}

impl FetchError {
    /// Wrap any displayable failure.
    pub fn failed(reason: impl Display) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Master error type for all staleview errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StaleviewError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

impl StaleviewError {
    /// Returns true for errors raised by a misconfigured orchestrator.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for staleview operations.
pub type StaleviewResult<T> = Result<T, StaleviewError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_corrupt_record() {
        let err = StorageError::CorruptRecord {
            key: CacheKey::from("profile"),
            reason: "truncated header".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Corrupt record"));
        assert!(msg.contains("profile"));
        assert!(msg.contains("truncated header"));
    }

    #[test]
    fn test_config_error_display_missing_required() {
        let err = ConfigError::MissingRequired {
            field: "on_data".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Missing required"));
        assert!(msg.contains("on_data"));
    }

    #[test]
    fn test_fetch_error_failed_helper() {
        let err = FetchError::failed("connection reset");
        assert_eq!(
            err,
            FetchError::Failed {
                reason: "connection reset".to_string()
            }
        );
        assert!(format!("{}", err).contains("connection reset"));
    }

    #[test]
    fn test_staleview_error_from_variants() {
        let storage = StaleviewError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, StaleviewError::Storage(_)));

        let codec = StaleviewError::from(CodecError::Decode {
            reason: "eof".to_string(),
        });
        assert!(matches!(codec, StaleviewError::Codec(_)));

        let config = StaleviewError::from(ConfigError::MissingRequired {
            field: "fetch_source".to_string(),
        });
        assert!(matches!(config, StaleviewError::Config(_)));
        assert!(config.is_config());

        let fetch = StaleviewError::from(FetchError::failed("offline"));
        assert!(matches!(fetch, StaleviewError::Fetch(_)));
        assert!(!fetch.is_config());
    }

    #[test]
    fn test_storage_error_display_lock_poisoned() {
        let err = StorageError::LockPoisoned;
        let msg = format!("{}", err);
        assert!(msg.contains("lock poisoned"));
    }
}
