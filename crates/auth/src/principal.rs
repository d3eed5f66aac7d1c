use serde::{Deserialize, Serialize};

use chatdesk_core::UserId;

use crate::Role;

/// Identity claims extracted from a verified bearer token.
///
/// The role carried here is what the token was minted with; authorization
/// decisions use the role re-read from the credential store (see `Scope`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: UserId, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            email: email.into(),
            role,
        }
    }
}
