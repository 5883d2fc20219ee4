//! Host configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! storage_dir = "/var/lib/porthole"
//! placeholder_titles = true
//!
//! [storage_keys]
//! cache = "appCache"
//!
//! [log]
//! filter = "porthole=debug"
//! json = false
//! ```

use std::path::PathBuf;

use serde::Deserialize;

use porthole_store::StorageKeys;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[cfg(feature = "config")]
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Logging settings consumed by the facade's subscriber setup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive string.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

/// Host settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Keys of the cached values in storage.
    pub storage_keys: StorageKeys,
    /// Directory for file-backed storage. `None` keeps storage in memory.
    pub storage_dir: Option<PathBuf>,
    /// Fill blank titles of new todos and projects with generated text.
    pub placeholder_titles: bool,
    pub log: LogConfig,
}

#[cfg(feature = "config")]
impl HostConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on syntax errors or mistyped fields.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded host config");
        Ok(config)
    }
}
