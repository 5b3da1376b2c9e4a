//! Immutable cache records.

use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{CacheKey, Timestamp};

/// One cached entry: a key, the encoded payload, and a validity deadline.
///
/// Records are never mutated. Replacing an entry means building a new record
/// and writing it over the old slot. Two records compare equal when their keys
/// match, since a key identifies a storage slot.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    key: CacheKey,
    payload: String,
    valid_until: Timestamp,
}

impl CacheRecord {
    /// Create a record with an explicit deadline.
    pub fn new(key: impl Into<CacheKey>, payload: impl Into<String>, valid_until: Timestamp) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            valid_until,
        }
    }

    /// Create a record stored at `stored_at` that stays valid for `validity`.
    ///
    /// Without a validity the deadline equals the store time, so the record is
    /// stale as soon as it is written.
    pub fn expiring(
        key: impl Into<CacheKey>,
        payload: impl Into<String>,
        stored_at: Timestamp,
        validity: Option<Duration>,
    ) -> Self {
        let valid_until = validity
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .and_then(|d| stored_at.checked_add_signed(d))
            .unwrap_or_else(|| match validity {
                // Overflowing durations mean "effectively forever".
                Some(_) => DateTime::<Utc>::MAX_UTC,
                None => stored_at,
            });
        Self::new(key, payload, valid_until)
    }

    /// The slot this record occupies.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The encoded domain value.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Instant after which the record is stale.
    pub fn valid_until(&self) -> Timestamp {
        self.valid_until
    }

    /// True once `now` has reached the deadline.
    pub fn is_stale_at(&self, now: Timestamp) -> bool {
        self.valid_until <= now
    }

    /// True if the deadline has passed.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    /// Remaining validity, zero if already stale.
    pub fn time_to_live(&self) -> Duration {
        (self.valid_until - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Split the record into its parts.
    pub fn into_parts(self) -> (CacheKey, String, Timestamp) {
        (self.key, self.payload, self.valid_until)
    }
}

impl PartialEq for CacheRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for CacheRecord {}

impl Hash for CacheRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
