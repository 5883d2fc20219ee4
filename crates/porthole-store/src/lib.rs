#![forbid(unsafe_code)]

//! Porthole persistence adapter.
//!
//! Maps a small set of named JSON values to and from local key/value storage.
//! Used twice in a host's life: once at cold start to build [`Flags`], and in
//! steady state whenever the application asks to save or clear a value.
//!
//! - [`LocalStore`] - JSON read/write with null-removes semantics.
//! - [`StorageBackend`] - the text storage seam ([`MemoryStorage`],
//!   [`FileStorage`], and `WebStorage` behind the `web` feature).
//! - [`Flags`] / [`StorageKeys`] - the cold-start payload.

pub mod adapter;
pub mod backend;
pub mod flags;

pub use adapter::LocalStore;
#[cfg(feature = "web")]
pub use backend::WebStorage;
pub use backend::{FileStorage, MemoryStorage, StorageBackend, StorageError};
pub use flags::{Flags, StorageKeys};
