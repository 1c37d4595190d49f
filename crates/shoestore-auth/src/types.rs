//! Session, user, profile and auth event types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

/// Token pair for the signed-in user. At most one per client context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
    /// Unix timestamp (seconds) after which the tokens are stale.
    pub expires_at: i64,
    pub user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Vendedor,
}

impl Role {
    /// Mock classification: any email containing `admin` is an administrator.
    pub fn for_email(email: &str) -> Self {
        if email.to_lowercase().contains("admin") {
            Self::Admin
        } else {
            Self::Vendedor
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Vendedor => "vendedor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application profile of a user; `id` equals the owning user's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    pub role: Role,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    InitialSession,
    TokenRefreshed,
}

/// Auth state change delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub const fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    pub const fn signed_out() -> Self {
        Self::new(AuthEventKind::SignedOut, None)
    }

    /// The current state as a synthetic event for a new subscriber.
    pub fn current(session: Option<Session>) -> Self {
        match session {
            Some(session) => Self::new(AuthEventKind::SignedIn, Some(session)),
            None => Self::signed_out(),
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }
}
