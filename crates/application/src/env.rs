//! Environment-shaped configuration.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::ApplicationError;

/// Configuration keys recognized by the application layer.
///
/// Backend-specific keys (connection strings and the like) are opaque to the
/// core and passed through to the infrastructure factory.
pub mod keys {
    /// Set by the application builder; backend factories may use it to
    /// namespace their storage (e.g. table prefixes).
    pub const APPLICATION_NAME: &str = "APPLICATION_NAME";
    /// Selects the recorder backend in the factory registry.
    pub const PERSISTENCE_MODULE: &str = "PERSISTENCE_MODULE";
    /// Truthy values: "y", "yes", "true", "1" (case-insensitive).
    pub const IS_SNAPSHOTTING_ENABLED: &str = "IS_SNAPSHOTTING_ENABLED";
    pub const COMPRESSOR_TOPIC: &str = "COMPRESSOR_TOPIC";
    pub const CIPHER_TOPIC: &str = "CIPHER_TOPIC";
    /// Raw bytes or base64.
    pub const CIPHER_KEY: &str = "CIPHER_KEY";
    pub const AGGREGATE_CACHE_MAXSIZE: &str = "AGGREGATE_CACHE_MAXSIZE";
    pub const AGGREGATE_CACHE_FASTFORWARD: &str = "AGGREGATE_CACHE_FASTFORWARD";
    pub const NOTIFICATION_LOG_SECTION_SIZE: &str = "NOTIFICATION_LOG_SECTION_SIZE";
}

const TRUTHY: [&str; 4] = ["y", "yes", "true", "1"];

/// An ordered key/value configuration map.
///
/// Applications are configured by cascading maps: application defaults,
/// then the process environment, then explicit overrides. Later layers win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    values: BTreeMap<String, String>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the process environment.
    pub fn capture() -> Self {
        Self {
            values: std::env::vars().collect(),
        }
    }

    /// Overlay `overrides` on top of this map; overriding values win.
    pub fn merged(mut self, overrides: &Env) -> Self {
        for (key, value) in &overrides.values {
            self.values.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// True when the key is set to a truthy value.
    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|v| TRUTHY.contains(&v.to_ascii_lowercase().as_str()))
    }

    /// Parse an integer-valued key; a malformed value is a configuration bug.
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, ApplicationError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                ApplicationError::programming(format!("{key} must be an integer, got '{raw}'"))
            }),
        }
    }

    /// Read a key as bytes: base64 if it decodes, raw bytes otherwise.
    pub fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.get(key)
            .map(|raw| BASE64.decode(raw).unwrap_or_else(|_| raw.as_bytes().to_vec()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Env {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
