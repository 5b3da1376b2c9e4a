//! Cache keys.
//!
//! A [`CacheKey`] names one storage slot. Every orchestrator owns exactly one
//! key; by default it is derived from the domain type's stable tag so that two
//! caches over different types never collide.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Cacheable;

/// Identity of a cached slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a key from any string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the default key for a cacheable type from its type tag.
    pub fn for_type<T: Cacheable>() -> Self {
        Self(T::type_tag().to_string())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Consume the key, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&CacheKey> for CacheKey {
    fn from(key: &CacheKey) -> Self {
        key.clone()
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Profile {
        name: String,
    }

    impl Cacheable for Profile {
        fn type_tag() -> &'static str {
            "test.profile"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Feed {
        items: Vec<u32>,
    }

    impl Cacheable for Feed {
        fn type_tag() -> &'static str {
            "test.feed"
        }
    }

    #[test]
    fn test_for_type_uses_type_tag() {
        assert_eq!(CacheKey::for_type::<Profile>().as_str(), "test.profile");
        assert_ne!(CacheKey::for_type::<Profile>(), CacheKey::for_type::<Feed>());
    }

    #[test]
    fn test_display_matches_inner() {
        let key = CacheKey::new("home.feed");
        assert_eq!(key.to_string(), "home.feed");
        assert_eq!(key.into_inner(), "home.feed");
    }

    proptest! {
        /// Property: keys built from equal strings are equal, whatever the source type.
        #[test]
        fn prop_key_from_str_and_string_agree(raw in ".{0,64}") {
            let a = CacheKey::from(raw.as_str());
            let b = CacheKey::from(raw.clone());
            prop_assert_eq!(a.as_bytes(), raw.as_bytes());
            prop_assert_eq!(a, b);
        }
    }
}
