//! Payload codec.
//!
//! Converts domain values to and from the JSON payload held in a
//! [`CacheRecord`](staleview_core::CacheRecord). Fields can be excluded by
//! path; excluded fields are never written and are stripped again on read, so
//! a payload written by an older configuration cannot leak them back.
//!
//! Excluded fields come back absent, which means the domain type must accept
//! that: use `Option<_>` or `#[serde(default)]` on every excluded field.

use std::collections::BTreeSet;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use staleview_core::{CodecError, StaleviewResult};

/// Separator for nested field paths, e.g. `"owner.session_token"`.
const PATH_SEPARATOR: char = '.';

/// JSON codec with per-field exclusion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonCodec {
    excluded: BTreeSet<String>,
}

impl JsonCodec {
    /// Create a codec that writes every field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude a field (or dot-separated nested field) from the payload.
    pub fn exclude(mut self, path: impl Into<String>) -> Self {
        self.excluded.insert(path.into());
        self
    }

    /// Exclude several fields at once.
    pub fn exclude_all<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Paths currently excluded.
    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }

    /// Encode a value into a payload string.
    pub fn encode<T: Serialize>(&self, value: &T) -> StaleviewResult<String> {
        let mut json = serde_json::to_value(value).map_err(|e| CodecError::Encode {
            reason: e.to_string(),
        })?;
        self.strip(&mut json);
        serde_json::to_string(&json).map_err(|e| {
            CodecError::Encode {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Decode a payload string into a value.
    pub fn decode<T: DeserializeOwned>(&self, payload: &str) -> StaleviewResult<T> {
        let mut json: Value = serde_json::from_str(payload).map_err(|e| CodecError::Decode {
            reason: e.to_string(),
        })?;
        self.strip(&mut json);
        serde_json::from_value(json).map_err(|e| {
            CodecError::Decode {
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn strip(&self, json: &mut Value) {
        for path in &self.excluded {
            remove_path(json, path);
        }
    }
}

/// Remove a dot-separated path from a JSON value.
///
/// Arrays met along the way apply the rest of the path to every element.
/// Missing segments and scalar intermediates are ignored.
fn remove_path(json: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    remove_segments(json, &segments);
}

fn remove_segments(json: &mut Value, segments: &[&str]) {
    match json {
        Value::Array(items) => {
            for item in items {
                remove_segments(item, segments);
            }
        }
        Value::Object(map) => match segments {
            [] => {}
            [last] => {
                map.remove(*last);
            }
            [head, rest @ ..] => {
                if let Some(next) = map.get_mut(*head) {
                    remove_segments(next, rest);
                }
            }
        },
        _ => {}
    }
}
