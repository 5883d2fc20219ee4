//! Cold-start flags handed to the application at construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use porthole_core::Viewport;

use crate::adapter::LocalStore;
use crate::backend::StorageBackend;

/// Storage keys of the cached values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct StorageKeys {
    pub cache: String,
    pub todo_list: String,
    pub project_list: String,
    pub auth_state: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            cache: "appCache".into(),
            todo_list: "cachedTodoList".into(),
            project_list: "cachedProjectList".into(),
            auth_state: "cachedAuthState".into(),
        }
    }
}

/// Initial state supplied once to the application.
///
/// Every cached entry is `null` when missing or unparsable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flags {
    pub cached_todo_list: Value,
    pub cached_project_list: Value,
    pub cached_auth_state: Value,
    pub browser_size: Viewport,
    pub cache: Value,
}

impl Flags {
    /// Read every cached value from `store`.
    pub fn load<B: StorageBackend>(
        store: &LocalStore<B>,
        keys: &StorageKeys,
        browser_size: Viewport,
    ) -> Self {
        let read = |key: &str| store.read_json(key).unwrap_or(Value::Null);
        Self {
            cached_todo_list: read(&keys.todo_list),
            cached_project_list: read(&keys.project_list),
            cached_auth_state: read(&keys.auth_state),
            browser_size,
            cache: read(&keys.cache),
        }
    }

    /// Wire form of the flags.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
