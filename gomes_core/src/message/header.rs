use std::collections::HashMap;
use thiserror::Error;

/// Header keys that may only be set once, at build time, by the
/// [`MessageBuilder`](super::MessageBuilder) itself.
pub const RESTRICTED_KEYS: [&str; 4] = ["messageId", "messageType", "timestamp", "origin"];

/// Returned by [`HeaderMap::try_set`] when the caller attempts to overwrite a
/// header that is only ever assigned by the builder.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("header {key:?} is restricted and cannot be set directly")]
pub struct RestrictedHeaderError {
    /// The offending header key.
    pub key: String,
}

/// Returned by [`crate::message::MessageBuilder::from_headers`] when a
/// recognized key carries a value that cannot be parsed into its typed form.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("header {key:?} has an unparseable value: {value:?}")]
pub struct HeaderParseError {
    /// The offending header key.
    pub key: String,
    /// The raw value that failed to parse.
    pub value: String,
}

/// An immutable, defensively-copyable header map.
///
/// Keys are unique; a fixed subset is [restricted](RESTRICTED_KEYS) and can
/// only be populated through the builder. Reading an absent key yields an
/// empty string rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: HashMap<String, String>,
}

impl HeaderMap {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, or an empty string if absent.
    pub fn get(&self, key: &str) -> &str {
        self.entries.get(key).map(String::as_str).unwrap_or("")
    }

    /// Reports whether `key` is present (even if its value is empty).
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Sets `key` to `value`, rejecting restricted keys.
    pub fn try_set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), RestrictedHeaderError> {
        let key = key.into();

        if RESTRICTED_KEYS.contains(&key.as_str()) {
            return Err(RestrictedHeaderError { key });
        }

        self.entries.insert(key, value.into());
        Ok(())
    }

    /// Sets `key` to `value` regardless of whether it is restricted. Only
    /// the builder should call this, at construction time.
    pub(crate) fn force_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Returns a defensive copy of every header entry.
    pub fn all(&self) -> HashMap<String, String> {
        self.entries.clone()
    }

    /// Iterates over every header entry by reference.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
