#![forbid(unsafe_code)]

//! Session-scoped resource gateway.
//!
//! [`Gateway`] sits between the port bridge and two backends: an
//! [`IdentityProvider`] that reports who is signed in and a [`DocumentStore`]
//! with live queries. It scopes every path under the signed-in user, keeps one
//! listener per query id, and tears session-scoped resources down on every
//! session transition.
//!
//! [`MemoryIdentity`] and [`MemoryStore`] implement the backends in process.

pub mod backend;
pub mod defaults;
pub mod gateway;
pub mod memory;
pub mod scope;

pub use backend::{
    AuthCallback, Completion, DocumentStore, IdentityProvider, Query, SnapshotCallback,
    ignore_completion,
};
pub use defaults::{FieldDefaults, NoDefaults, PlaceholderTitles};
pub use gateway::{Gateway, GatewayBuilder, SessionCallback};
pub use memory::{MemoryIdentity, MemoryStore};
pub use scope::{CollectionRef, DocumentRef};
