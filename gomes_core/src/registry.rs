//! A generic, thread-safe keyed container used for every named collection
//! the middleware tracks (connections, channels, handlers, consumers).

use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

/// A generic, thread-safe keyed container used for every named collection
/// the bootstrap surface manages: connections, publisher/consumer channel
/// builders, action handlers, and active endpoints.
///
/// Reads take a shared lock; writes take an exclusive lock. There is no
/// iteration during mutation: [`get_all`](Registry::get_all) returns a
/// defensive snapshot.
pub struct Registry<T> {
    entries: RwLock<HashMap<String, T>>,
}

/// Returned when a lookup finds no entry under the given name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no entry registered under {name:?}")]
pub struct NotFoundError {
    /// The name that was looked up.
    pub name: String,
}

/// Returned when registering a name that is already taken.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("an entry is already registered under {name:?}")]
pub struct DuplicateError {
    /// The name that was already taken.
    pub name: String,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `name`, failing if the name is already taken.
    pub fn set(&self, name: impl Into<String>, value: T) -> Result<(), DuplicateError> {
        let name = name.into();
        let mut entries = self.entries.write();

        if entries.contains_key(&name) {
            return Err(DuplicateError { name });
        }

        entries.insert(name, value);
        Ok(())
    }

    /// Reports whether `name` is registered.
    pub fn has(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Retrieves the entry registered under `name`.
    pub fn get(&self, name: &str) -> Result<T, NotFoundError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| NotFoundError {
                name: name.to_string(),
            })
    }

    /// Replaces the entry registered under `name`, failing if absent.
    pub fn replace(&self, name: &str, value: T) -> Result<(), NotFoundError> {
        let mut entries = self.entries.write();

        if !entries.contains_key(name) {
            return Err(NotFoundError {
                name: name.to_string(),
            });
        }

        entries.insert(name.to_string(), value);
        Ok(())
    }

    /// Removes the entry registered under `name`, if any.
    pub fn remove(&self, name: &str) -> Option<T> {
        self.entries.write().remove(name)
    }

    /// Returns a defensive snapshot of every registered entry.
    pub fn get_all(&self) -> HashMap<String, T> {
        self.entries.read().clone()
    }
}
