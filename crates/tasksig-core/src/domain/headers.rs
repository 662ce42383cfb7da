//! Signature metadata headers.
//!
//! Two representations coexist:
//! - [`Headers`]: the current schema, multi-valued (`key -> [value, ...]`) like
//!   an HTTP header collection.
//! - [`LegacyHeaders`]: the deprecated schema, single-valued and untyped
//!   (`key -> any JSON value`).
//!
//! Both implement the carrier pair used by trace propagation
//! ([`TextMapWriter`] / [`TextMapReader`]), so trace context can be injected
//! before dispatch and extracted by the worker after delivery.
//!
//! Keys are case-sensitive and stored verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Iteration over a header carrier was aborted by its handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("header iteration aborted at `{key}`: {reason}")]
pub struct PropagationError {
    pub key: String,
    pub reason: String,
}

impl PropagationError {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Write side of a trace-context carrier.
pub trait TextMapWriter {
    fn set(&mut self, key: &str, value: &str);
}

/// Read side of a trace-context carrier.
///
/// Only string-valued entries are visited. The first handler error stops the
/// iteration and is returned as-is.
pub trait TextMapReader {
    fn foreach_key<F>(&self, handler: F) -> Result<(), PropagationError>
    where
        F: FnMut(&str, &str) -> Result<(), PropagationError>;
}

// ========================================
// Current schema
// ========================================

/// Multi-valued header map (current schema).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Append a value, keeping any values already stored under `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Replace every value stored under `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), vec![value.into()]);
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Collect every entry a carrier exposes, appending repeated keys.
    pub fn from_reader<R: TextMapReader + ?Sized>(reader: &R) -> Result<Self, PropagationError> {
        let mut headers = Self::new();
        reader.foreach_key(|key, value| {
            headers.add(key, value);
            Ok(())
        })?;
        Ok(headers)
    }
}

impl From<BTreeMap<String, Vec<String>>> for Headers {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.add(k, v);
        }
        headers
    }
}

impl TextMapWriter for Headers {
    fn set(&mut self, key: &str, value: &str) {
        Headers::set(self, key, value);
    }
}

impl TextMapReader for Headers {
    fn foreach_key<F>(&self, mut handler: F) -> Result<(), PropagationError>
    where
        F: FnMut(&str, &str) -> Result<(), PropagationError>,
    {
        for (key, values) in &self.0 {
            for value in values {
                handler(key, value)?;
            }
        }
        Ok(())
    }
}

// ========================================
// Legacy schema
// ========================================

/// Single-valued, untyped header map (legacy schema).
///
/// Only string values are meaningful for trace propagation; everything else
/// is invisible to [`TextMapReader::foreach_key`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LegacyHeaders(BTreeMap<String, serde_json::Value>);

impl LegacyHeaders {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Store an arbitrary value, replacing the previous one.
    pub fn insert_value(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, serde_json::Value>> for LegacyHeaders {
    fn from(map: BTreeMap<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, serde_json::Value)> for LegacyHeaders {
    fn from_iter<I: IntoIterator<Item = (K, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl TextMapWriter for LegacyHeaders {
    fn set(&mut self, key: &str, value: &str) {
        self.insert_value(key, serde_json::Value::String(value.to_string()));
    }
}

impl TextMapReader for LegacyHeaders {
    fn foreach_key<F>(&self, mut handler: F) -> Result<(), PropagationError>
    where
        F: FnMut(&str, &str) -> Result<(), PropagationError>,
    {
        for (key, value) in &self.0 {
            let Some(value) = value.as_str() else {
                tracing::trace!(key = %key, "skipping non-string legacy header");
                continue;
            };
            handler(key, value)?;
        }
        Ok(())
    }
}
