#![forbid(unsafe_code)]

//! Porthole core vocabulary.
//!
//! This crate holds the pieces every other Porthole crate agrees on:
//!
//! - [`DisposerRegistry`] - anonymous and keyed teardown callbacks.
//! - [`channel`] - the static channel registry and composition-time checks.
//! - [`message`] - typed payloads for every registry channel.
//! - [`SessionState`] / [`User`] - the authenticated identity.
//! - [`Error`] - the shared error taxonomy.
//!
//! # Role in Porthole
//! `porthole-core` has no I/O. The gateway, store and bridge crates build on
//! it; applications only see it through the `porthole` facade.

pub mod channel;
pub mod disposer;
pub mod error;
pub mod message;
pub mod session;

pub use channel::{ChannelDecl, Direction, FromAppChannel, ToAppChannel, WiringDiagnostic};
pub use disposer::{Disposer, DisposerRegistry, WeakDisposerRegistry};
pub use error::{BackendError, Error, IdentifierKind, Result};
pub use message::{DocData, FromAppMsg, Operator, Rect, ToAppMsg, Viewport, WhereClause};
pub use session::{SessionState, User};
