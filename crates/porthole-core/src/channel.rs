#![forbid(unsafe_code)]

//! Channel declarations and the static channel registry.
//!
//! A channel is a named, one-way message slot between the application and the
//! host. Direction is always stated from the application's point of view:
//!
//! - [`Direction::FromApp`]: the application emits, the host subscribes.
//! - [`Direction::ToApp`]: the host sends, the application receives.
//!
//! The host knows a fixed set of channels ([`FromAppChannel`],
//! [`ToAppChannel`]). [`verify`] diffs that set against what an application
//! declares so mismatches surface when the host is composed, not when the first
//! message goes missing.
//!
//! # Invariants
//!
//! 1. Port names are unique within a direction.
//! 2. `from_name(c.name()) == Some(c)` for every registry channel.
//! 3. The registry never invents channels; it only reports differences.

use std::collections::BTreeMap;
use std::fmt;

/// Which way a channel carries messages, relative to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Application → host.
    FromApp,
    /// Host → application.
    ToApp,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FromApp => f.write_str("from-app"),
            Self::ToApp => f.write_str("to-app"),
        }
    }
}

/// A channel as declared by the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelDecl {
    pub name: String,
    pub direction: Direction,
}

impl ChannelDecl {
    /// Declare an application → host channel.
    pub fn from_app(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::FromApp,
        }
    }

    /// Declare a host → application channel.
    pub fn to_app(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::ToApp,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry channels
// ---------------------------------------------------------------------------

/// Channels the application emits on and the host handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FromAppChannel {
    LocalStorageSetJsonItem,
    SetCache,
    SignIn,
    SignOut,
    ChangeTodoTitle,
    UpdateFirestoreDoc,
    DeleteFirestoreDoc,
    AddFirestoreDoc,
    QueryFirestore,
    DisposeFirestoreQuery,
    GetBoundingClientRects,
}

impl FromAppChannel {
    /// Every registry channel in this direction.
    pub const ALL: [Self; 11] = [
        Self::LocalStorageSetJsonItem,
        Self::SetCache,
        Self::SignIn,
        Self::SignOut,
        Self::ChangeTodoTitle,
        Self::UpdateFirestoreDoc,
        Self::DeleteFirestoreDoc,
        Self::AddFirestoreDoc,
        Self::QueryFirestore,
        Self::DisposeFirestoreQuery,
        Self::GetBoundingClientRects,
    ];

    /// Wire port name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LocalStorageSetJsonItem => "localStorageSetJsonItem",
            Self::SetCache => "setCache",
            Self::SignIn => "signIn",
            Self::SignOut => "signOut",
            Self::ChangeTodoTitle => "changeTodoTitle",
            Self::UpdateFirestoreDoc => "updateFirestoreDoc",
            Self::DeleteFirestoreDoc => "deleteFirestoreDoc",
            Self::AddFirestoreDoc => "addFirestoreDoc",
            Self::QueryFirestore => "queryFirestore",
            Self::DisposeFirestoreQuery => "disposeFirestoreQuery",
            Self::GetBoundingClientRects => "getBoundingClientRects",
        }
    }

    /// Look a channel up by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for FromAppChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channels the host sends on and the application receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToAppChannel {
    OnAuthStateChanged,
    OnFirestoreQueryResponse,
    GotBoundingClientRects,
}

impl ToAppChannel {
    /// Every registry channel in this direction.
    pub const ALL: [Self; 3] = [
        Self::OnAuthStateChanged,
        Self::OnFirestoreQueryResponse,
        Self::GotBoundingClientRects,
    ];

    /// Wire port name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OnAuthStateChanged => "onAuthStateChanged",
            Self::OnFirestoreQueryResponse => "onFirestoreQueryResponse",
            Self::GotBoundingClientRects => "gotBoundingClientRects",
        }
    }

    /// Look a channel up by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for ToAppChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every registry channel with its direction.
#[must_use]
pub fn registry() -> Vec<ChannelDecl> {
    FromAppChannel::ALL
        .into_iter()
        .map(|c| ChannelDecl::from_app(c.name()))
        .chain(ToAppChannel::ALL.into_iter().map(|c| ChannelDecl::to_app(c.name())))
        .collect()
}

// ---------------------------------------------------------------------------
// Composition-time verification
// ---------------------------------------------------------------------------

/// A difference between the registry and an application's declared channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WiringDiagnostic {
    /// The application declares a channel the host does not know.
    Unknown { name: String, direction: Direction },
    /// The host knows a channel the application does not declare.
    Undeclared { name: String, direction: Direction },
    /// Both sides know the name but disagree on direction.
    DirectionMismatch {
        name: String,
        declared: Direction,
        expected: Direction,
    },
}

impl WiringDiagnostic {
    /// Port name the diagnostic refers to.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Unknown { name, .. }
            | Self::Undeclared { name, .. }
            | Self::DirectionMismatch { name, .. } => name,
        }
    }
}

impl fmt::Display for WiringDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { name, direction } => {
                write!(f, "application declares unknown {direction} port '{name}'")
            }
            Self::Undeclared { name, direction } => {
                write!(f, "{direction} port '{name}' is not declared by the application")
            }
            Self::DirectionMismatch {
                name,
                declared,
                expected,
            } => write!(f, "port '{name}' declared {declared}, expected {expected}"),
        }
    }
}

/// Diff `declared` against the registry.
///
/// Diagnostics come out sorted by port name so reports are stable.
#[must_use]
pub fn verify(declared: &[ChannelDecl]) -> Vec<WiringDiagnostic> {
    let known: BTreeMap<String, Direction> = registry()
        .into_iter()
        .map(|decl| (decl.name, decl.direction))
        .collect();
    let mut seen: BTreeMap<&str, Direction> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for decl in declared {
        seen.insert(decl.name.as_str(), decl.direction);
        match known.get(&decl.name) {
            None => diagnostics.push(WiringDiagnostic::Unknown {
                name: decl.name.clone(),
                direction: decl.direction,
            }),
            Some(&expected) if expected != decl.direction => {
                diagnostics.push(WiringDiagnostic::DirectionMismatch {
                    name: decl.name.clone(),
                    declared: decl.direction,
                    expected,
                });
            }
            Some(_) => {}
        }
    }

    for (name, &direction) in &known {
        if !seen.contains_key(name.as_str()) {
            diagnostics.push(WiringDiagnostic::Undeclared {
                name: name.clone(),
                direction,
            });
        }
    }

    diagnostics.sort_by(|a, b| a.name().cmp(b.name()));
    diagnostics
}
