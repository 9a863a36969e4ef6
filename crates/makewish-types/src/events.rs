use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session changes published by the client session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AuthEvent {
    /// A session was established through sign-in or sign-up
    SignedIn { user_id: Uuid, email: String },

    /// The local session was dropped
    SignedOut,

    /// The access token was replaced by a fresh one
    TokenRefreshed { user_id: Uuid },

    /// A session was established from a password-reset link
    PasswordRecovery { user_id: Uuid, email: String },

    /// The signed-in user's credentials changed
    UserUpdated { user_id: Uuid },
}

impl AuthEvent {
    /// Returns the user this event concerns, if any.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::SignedIn { user_id, .. } => Some(*user_id),
            Self::TokenRefreshed { user_id } => Some(*user_id),
            Self::PasswordRecovery { user_id, .. } => Some(*user_id),
            Self::UserUpdated { user_id } => Some(*user_id),
            Self::SignedOut => None,
        }
    }
}
