//! Store configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults
//! for development.

use std::path::PathBuf;
use std::time::Duration;

use staleview_core::{ConfigError, StaleviewResult};

/// Default LMDB directory, relative to the working directory.
const DEFAULT_CACHE_DIR: &str = ".staleview-cache";

/// Default LMDB map size in megabytes.
const DEFAULT_MAX_SIZE_MB: usize = 64;

/// Configuration for the durable tier and orchestrator defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding the LMDB environment.
    pub path: PathBuf,

    /// Maximum size of the LMDB map in megabytes.
    pub max_size_mb: usize,

    /// Validity applied by orchestrators that do not set their own.
    /// `None` keeps records immediately stale.
    pub default_validity: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CACHE_DIR),
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            default_validity: None,
        }
    }
}

impl StoreConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `STALEVIEW_CACHE_DIR`: LMDB directory (default: `.staleview-cache`)
    /// - `STALEVIEW_CACHE_MAX_MB`: LMDB map size in MB (default: 64)
    /// - `STALEVIEW_DEFAULT_VALIDITY_MS`: default record validity in
    ///   milliseconds (default: unset, records are immediately stale)
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("STALEVIEW_CACHE_DIR")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

        let max_size_mb = lookup("STALEVIEW_CACHE_MAX_MB")
            .and_then(|s| s.trim().parse().ok())
            .filter(|mb: &usize| *mb > 0)
            .unwrap_or(DEFAULT_MAX_SIZE_MB);

        let default_validity = lookup("STALEVIEW_DEFAULT_VALIDITY_MS")
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_millis);

        Self {
            path,
            max_size_mb,
            default_validity,
        }
    }

    /// Set the LMDB directory.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the LMDB map size.
    pub fn with_max_size_mb(mut self, max_size_mb: usize) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    /// Set the default validity.
    pub fn with_default_validity(mut self, validity: Duration) -> Self {
        self.default_validity = Some(validity);
        self
    }

    /// Reject settings the durable tier cannot open with.
    pub fn validate(&self) -> StaleviewResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(invalid("path", "", "must not be empty"));
        }
        if self.max_size_mb == 0 {
            return Err(invalid("max_size_mb", "0", "must be at least 1"));
        }
        if self.max_size_mb.checked_mul(1024 * 1024).is_none() {
            return Err(invalid(
                "max_size_mb",
                &self.max_size_mb.to_string(),
                "map size overflows usize",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> staleview_core::StaleviewError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.max_size_mb, 64);
        assert_eq!(config.default_validity, None);
    }

    #[test]
    fn test_env_values() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("STALEVIEW_CACHE_DIR", "/var/cache/app"),
            ("STALEVIEW_CACHE_MAX_MB", "256"),
            ("STALEVIEW_DEFAULT_VALIDITY_MS", "30000"),
        ]));
        assert_eq!(config.path, PathBuf::from("/var/cache/app"));
        assert_eq!(config.max_size_mb, 256);
        assert_eq!(config.default_validity, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("STALEVIEW_CACHE_DIR", "   "),
            ("STALEVIEW_CACHE_MAX_MB", "lots"),
            ("STALEVIEW_DEFAULT_VALIDITY_MS", "-5"),
        ]));
        assert_eq!(config, StoreConfig::default());

        let zero = StoreConfig::from_lookup(lookup_from(&[("STALEVIEW_CACHE_MAX_MB", "0")]));
        assert_eq!(zero.max_size_mb, 64);
    }

    #[test]
    fn test_validate() {
        assert!(StoreConfig::default().validate().is_ok());

        let err = StoreConfig::new()
            .with_max_size_mb(0)
            .validate()
            .expect_err("zero map size should be rejected");
        assert!(matches!(
            err,
            staleview_core::StaleviewError::Config(ConfigError::InvalidValue { ref field, .. })
                if field == "max_size_mb"
        ));

        let err = StoreConfig::new()
            .with_path("")
            .validate()
            .expect_err("empty path should be rejected");
        assert!(err.is_config());
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new()
            .with_path("/tmp/x")
            .with_max_size_mb(8)
            .with_default_validity(Duration::from_millis(1500));
        assert_eq!(config.path, PathBuf::from("/tmp/x"));
        assert_eq!(config.max_size_mb, 8);
        assert_eq!(config.default_validity, Some(Duration::from_millis(1500)));
    }
}
