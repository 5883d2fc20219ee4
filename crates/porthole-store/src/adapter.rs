#![forbid(unsafe_code)]

//! JSON values over a [`StorageBackend`].
//!
//! # Invariants
//!
//! 1. Writing `null` removes the key; the text `"null"` is never stored.
//! 2. Each key is independent: no envelope, no version field, no batching.
//! 3. Reads never fail the caller. Unparsable or unreadable entries are logged
//!    and reported as absent.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Missing key | first run, cleared | `None` |
//! | Unparsable text | hand edits, truncated write | `None`, warning logged |
//! | Backend read error | storage disabled, I/O | `None`, warning logged |
//! | Backend write error | quota, I/O | `Err` to the caller |

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use porthole_core::Error;

use crate::backend::{StorageBackend, StorageError};

/// JSON persistence adapter.
#[derive(Debug, Clone)]
pub struct LocalStore<B> {
    backend: B,
}

impl<B: StorageBackend> LocalStore<B> {
    /// Wrap a backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Parsed value under `key`, or `None` if absent, `null`, or unparsable.
    pub fn read_json(&self, key: &str) -> Option<Value> {
        let text = match self.backend.get(key) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, error = %err, "storage read failed, treating as absent");
                return None;
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(err) => {
                let err = Error::MalformedStoredValue {
                    key: key.to_owned(),
                    reason: err.to_string(),
                };
                warn!(error = %err, "treating stored value as absent");
                None
            }
        }
    }

    /// Typed read. Values that do not deserialize into `T` count as absent.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.read_json(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                warn!(key, error = %err, "stored value has unexpected shape");
                None
            }
        }
    }

    /// Store `value` under `key`; `null` removes the key.
    ///
    /// # Errors
    ///
    /// [`StorageError::InvalidKey`] for blank keys, otherwise whatever the
    /// backend reports.
    pub fn write_json(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        if key.trim().is_empty() {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        if value.is_null() {
            debug!(key, "removing stored value");
            return self.backend.remove(key);
        }
        let text = value.to_string();
        debug!(key, bytes = text.len(), "storing value");
        self.backend.set(key, &text)
    }

    /// Serialize and store `value`; `None` removes the key.
    ///
    /// # Errors
    ///
    /// Same as [`write_json`](Self::write_json). Serialization failures are
    /// reported as [`StorageError::Unavailable`].
    pub fn write<T: Serialize>(&self, key: &str, value: Option<&T>) -> Result<(), StorageError> {
        let value = match value {
            Some(value) => serde_json::to_value(value)
                .map_err(|err| StorageError::Unavailable(err.to_string()))?,
            None => Value::Null,
        };
        self.write_json(key, &value)
    }

    /// Remove `key`.
    ///
    /// # Errors
    ///
    /// Whatever the backend reports.
    pub fn clear(&self, key: &str) -> Result<(), StorageError> {
        self.write_json(key, &Value::Null)
    }
}
