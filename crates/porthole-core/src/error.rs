//! Error taxonomy shared by every Porthole crate.
//!
//! | Variant | Raised by | Propagation |
//! |---------|-----------|-------------|
//! | `NoActiveSession` | scoped gateway operations | returned to the caller |
//! | `InvalidIdentifier` | scoped gateway operations, storage keys | returned to the caller |
//! | `ChannelNotFound` | port wiring | logged, wiring continues |
//! | `MalformedStoredValue` | persistence reads | logged, value treated as absent |
//! | `MalformedMessage` | typed port decoding | logged, message dropped |
//! | `Backend` | store / identity backends | delivered to the operation's completion |

use std::fmt;

/// What kind of identifier failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// A session-relative collection name.
    Collection,
    /// A session-relative document path.
    DocumentPath,
    /// A live query subscription id.
    QueryId,
    /// The uid of the signed-in user.
    Uid,
    /// A local storage key.
    StorageKey,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Collection => "collection name",
            Self::DocumentPath => "document path",
            Self::QueryId => "query id",
            Self::Uid => "uid",
            Self::StorageKey => "storage key",
        };
        f.write_str(name)
    }
}

/// Failure reported by an identity or document-store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The backend refused the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The target document does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The user abandoned an interactive flow (e.g. closed the sign-in popup).
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// Anything else.
    #[error("backend error: {0}")]
    Other(String),
}

/// Errors surfaced by Porthole operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The operation needs a signed-in session and there is none.
    #[error("operation requires a signed-in session")]
    NoActiveSession,

    /// A name, path or key was blank or malformed.
    #[error("invalid {kind}: {value:?}")]
    InvalidIdentifier { kind: IdentifierKind, value: String },

    /// A port name has no counterpart on the other side of the bridge.
    #[error("port not found: {name}")]
    ChannelNotFound { name: String },

    /// Stored text under `key` could not be parsed.
    #[error("malformed stored value under '{key}': {reason}")]
    MalformedStoredValue { key: String, reason: String },

    /// A port payload did not match its channel's shape.
    #[error("malformed message on '{channel}': {reason}")]
    MalformedMessage { channel: String, reason: String },

    /// A backend operation failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl Error {
    /// Shorthand for [`Error::InvalidIdentifier`].
    pub fn invalid(kind: IdentifierKind, value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            kind,
            value: value.into(),
        }
    }
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
