//! Authenticated identity as seen by the bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A signed-in user as reported by the identity backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
}

impl User {
    /// A user with only a uid.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    /// Builder-style display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Builder-style email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// The current session.
///
/// `SignedOut` is a resolved state and differs from `Unknown`, which only
/// exists until the identity backend reports for the first time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unknown,
    SignedOut,
    SignedIn(User),
}

impl SessionState {
    /// Session state for an optional user.
    #[must_use]
    pub fn from_user(user: Option<User>) -> Self {
        match user {
            Some(user) => Self::SignedIn(user),
            None => Self::SignedOut,
        }
    }

    /// Whether the identity backend has reported at least once.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::SignedIn(user) => Some(user),
            _ => None,
        }
    }

    /// The signed-in uid, if any.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.user().map(|u| u.uid.as_str())
    }

    /// Wire payload for `onAuthStateChanged`: the user object or `null`.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        self.user()
            .and_then(|user| serde_json::to_value(user).ok())
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signed_out_is_resolved_unknown_is_not() {
        assert!(!SessionState::Unknown.is_resolved());
        assert!(SessionState::SignedOut.is_resolved());
        assert!(SessionState::from_user(Some(User::new("u1"))).is_resolved());
    }

    #[test]
    fn payload_shapes() {
        assert_eq!(SessionState::SignedOut.to_payload(), Value::Null);
        assert_eq!(SessionState::Unknown.to_payload(), Value::Null);

        let user = User::new("u1").with_email("a@b.c");
        assert_eq!(
            SessionState::SignedIn(user).to_payload(),
            json!({"uid": "u1", "displayName": null, "email": "a@b.c", "photoURL": null})
        );
    }

    #[test]
    fn user_decodes_with_missing_optionals() {
        let user: User = serde_json::from_value(json!({"uid": "abc"})).unwrap();
        assert_eq!(user, User::new("abc"));
    }
}
