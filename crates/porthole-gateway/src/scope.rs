//! Session-scoped resource handles.
//!
//! Every path the application names is relative to the signed-in user and is
//! resolved against the session at the moment of use:
//! `users/{uid}/{name-or-path}`. Handles are values, not cached lookups; a
//! handle built before a session change keeps pointing at the old user and
//! must not be reused.
//!
//! Relative names are trimmed of surrounding whitespace and slashes. A
//! collection name must have an odd number of segments (`todos`,
//! `projects/p1/notes`), a document path an even number (`todos/t1`). Empty
//! segments are rejected.

use std::fmt;

use porthole_core::{Error, IdentifierKind, Result, SessionState};

/// Fully qualified collection path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionRef {
    name: String,
    path: String,
}

impl CollectionRef {
    /// Path relative to the user root, e.g. `todos`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path, e.g. `users/u1/todos`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Handle to the document `id` inside this collection.
    #[must_use]
    pub fn doc(&self, id: &str) -> DocumentRef {
        DocumentRef {
            path: format!("{}/{id}", self.path),
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Fully qualified document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    path: String,
}

impl DocumentRef {
    /// Full path, e.g. `users/u1/todos/t1`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment.
    #[must_use]
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Full path of the containing collection.
    #[must_use]
    pub fn parent_path(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map_or("", |(parent, _)| parent)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

fn signed_in_uid(session: &SessionState) -> Result<&str> {
    let uid = session.uid().ok_or(Error::NoActiveSession)?;
    if uid.trim().is_empty() || uid.contains('/') {
        return Err(Error::invalid(IdentifierKind::Uid, uid));
    }
    Ok(uid)
}

fn relative(raw: &str, kind: IdentifierKind, odd_segments: bool) -> Result<String> {
    let trimmed = raw.trim().trim_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();
    let well_formed = !trimmed.is_empty()
        && segments.iter().all(|s| !s.trim().is_empty())
        && (segments.len() % 2 == 1) == odd_segments;
    if !well_formed {
        return Err(Error::invalid(kind, raw));
    }
    Ok(trimmed.to_owned())
}

/// Resolve a collection name against `session`.
///
/// # Errors
///
/// [`Error::NoActiveSession`] without a signed-in user (checked first),
/// [`Error::InvalidIdentifier`] for blank or malformed names.
pub fn collection(session: &SessionState, name: &str) -> Result<CollectionRef> {
    let uid = signed_in_uid(session)?;
    let name = relative(name, IdentifierKind::Collection, true)?;
    let path = format!("users/{uid}/{name}");
    Ok(CollectionRef { name, path })
}

/// Resolve a document path against `session`.
///
/// # Errors
///
/// Same rules as [`collection`].
pub fn document(session: &SessionState, path: &str) -> Result<DocumentRef> {
    let uid = signed_in_uid(session)?;
    let path = relative(path, IdentifierKind::DocumentPath, false)?;
    Ok(DocumentRef {
        path: format!("users/{uid}/{path}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use porthole_core::User;

    fn signed_in(uid: &str) -> SessionState {
        SessionState::SignedIn(User::new(uid))
    }

    #[test]
    fn no_session_wins_over_blank_name() {
        for state in [SessionState::Unknown, SessionState::SignedOut] {
            assert_eq!(collection(&state, "todos"), Err(Error::NoActiveSession));
            assert_eq!(collection(&state, "   "), Err(Error::NoActiveSession));
            assert_eq!(document(&state, ""), Err(Error::NoActiveSession));
        }
    }

    #[test]
    fn blank_names_are_invalid() {
        let session = signed_in("u1");
        assert!(matches!(
            collection(&session, " \t"),
            Err(Error::InvalidIdentifier {
                kind: IdentifierKind::Collection,
                ..
            })
        ));
        assert!(matches!(
            document(&session, "  "),
            Err(Error::InvalidIdentifier {
                kind: IdentifierKind::DocumentPath,
                ..
            })
        ));
    }

    #[test]
    fn blank_uid_is_invalid() {
        assert!(matches!(
            collection(&signed_in(" "), "todos"),
            Err(Error::InvalidIdentifier {
                kind: IdentifierKind::Uid,
                ..
            })
        ));
    }

    #[test]
    fn uid_with_separator_is_invalid() {
        assert!(matches!(
            document(&signed_in("other/todos"), "todos/t1"),
            Err(Error::InvalidIdentifier {
                kind: IdentifierKind::Uid,
                ..
            })
        ));
    }

    #[test]
    fn paths_are_rooted_at_user() {
        let session = signed_in("u1");
        let todos = collection(&session, " todos ").unwrap();
        assert_eq!(todos.path(), "users/u1/todos");
        assert_eq!(todos.name(), "todos");

        let doc = document(&session, "todos/t1").unwrap();
        assert_eq!(doc.path(), "users/u1/todos/t1");
        assert_eq!(doc.id(), "t1");
        assert_eq!(doc.parent_path(), "users/u1/todos");
        assert_eq!(todos.doc("t1"), doc);
    }

    #[test]
    fn segment_parity_is_enforced() {
        let session = signed_in("u1");
        assert!(collection(&session, "todos/t1").is_err());
        assert!(document(&session, "todos").is_err());
        assert!(document(&session, "todos//t1").is_err());
        assert!(collection(&session, "projects/p1/notes").is_ok());
    }

    #[test]
    fn handles_follow_the_session_they_were_built_from() {
        let a = collection(&signed_in("alice"), "todos").unwrap();
        let b = collection(&signed_in("bob"), "todos").unwrap();
        assert_ne!(a, b);
        assert_eq!(b.path(), "users/bob/todos");
    }
}
