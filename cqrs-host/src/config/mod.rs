//! Layered key/value configuration.
//!
//! Keys are hierarchical, separated by [`KEY_DELIMITER`], and compared
//! case-insensitively. Sources are applied in the order they were added to a
//! [`ConfigurationBuilder`]; when two sources define the same key the most
//! recently added one wins.

/// Configuration errors.
pub mod error;
mod sources;

use std::{collections::BTreeMap, fmt, str::FromStr};

use error::ConfigError;
pub use sources::ConfigurationBuilder;

/// Separator between the segments of a hierarchical key, e.g.
/// `Comments:BaseUrl`.
pub const KEY_DELIMITER: &str = ":";

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    value: String,
}

/// Immutable snapshot of every configuration source, flattened to
/// `section:key` pairs.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    entries: BTreeMap<String, Entry>,
}

impl Configuration {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&normalize(key))
            .map(|entry| entry.value.as_str())
    }

    /// Like [`get`](Self::get), but a missing key is an error.
    pub fn get_required(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Parses the value for `key`. A missing key is `Ok(None)`; a value that
    /// does not parse is an error naming the key.
    pub fn get_value<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                message: err.to_string(),
            })
    }

    /// Whether `key` is set, ignoring ASCII case.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize(key))
    }

    /// Returns the entries below `section`, with the section prefix removed.
    pub fn section(&self, section: &str) -> Configuration {
        let prefix = format!("{}{KEY_DELIMITER}", normalize(section));
        let entries = self
            .entries
            .iter()
            .filter(|(normalized, _)| normalized.starts_with(&prefix))
            .map(|(normalized, entry)| {
                let key = entry.key[prefix.len()..].to_string();
                (normalized[prefix.len()..].to_string(), Entry {
                    key,
                    value: entry.value.clone(),
                })
            })
            .collect();
        Configuration { entries }
    }

    /// Iterates `(key, value)` pairs using the key spelling of the source
    /// that supplied the winning value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|entry| (entry.key.as_str(), entry.value.as_str()))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no source supplied any key.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, key: String, value: String) {
        let key = key.trim().to_string();
        self.entries.insert(normalize(&key), Entry { key, value });
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}
