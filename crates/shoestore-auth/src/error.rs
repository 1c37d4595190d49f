//! Error types for the auth crate.

use shoestore_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("No active session")]
    SessionMissing,

    #[error("Profile unavailable for user {user_id}")]
    ProfileUnavailable { user_id: String },

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session controller closed")]
    Closed,
}

impl AuthError {
    pub fn profile_unavailable(user_id: impl Into<String>) -> Self {
        Self::ProfileUnavailable {
            user_id: user_id.into(),
        }
    }
}
