//! Subscriber setup for hosts that do not install their own.
//!
//! The filter comes from [`LogConfig::filter`] unless the `PORTHOLE_LOG`
//! environment variable is set and non-blank, in which case it wins.

use tracing_subscriber::EnvFilter;

use crate::LogConfig;

/// Environment variable overriding the configured filter.
pub const LOG_ENV: &str = "PORTHOLE_LOG";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter {directive:?}: {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Filter directive in effect for `config`.
#[must_use]
pub fn effective_directive(config: &LogConfig) -> String {
    std::env::var(LOG_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.filter.clone())
}

/// Parse `directive` into a filter.
///
/// # Errors
///
/// [`LoggingError::Filter`] for malformed directives.
pub fn filter(directive: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directive).map_err(|source| LoggingError::Filter {
        directive: directive.to_owned(),
        source,
    })
}

/// Install the global fmt subscriber.
///
/// # Errors
///
/// [`LoggingError::Filter`] for a malformed filter,
/// [`LoggingError::AlreadyInstalled`] if a global subscriber exists.
pub fn init(config: &LogConfig) -> Result<(), LoggingError> {
    let directive = effective_directive(config);
    let env_filter = filter(&directive)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|_| LoggingError::AlreadyInstalled)?;
    tracing::debug!(%directive, json = config.json, "logging initialized");
    Ok(())
}
