use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use chatdesk_auth::{Identity, Scope};
use chatdesk_core::{BranchId, WhatsAppAccountId};

use super::AccessError;
use crate::store::{CredentialStore, UserRecord};

/// Resolves an authenticated [`Identity`] into a fresh [`Scope`].
///
/// One credential-store round trip per call; nothing is cached. The role is
/// taken from the store, not the token, so a demotion applies on the next
/// request. A lookup that exceeds the timeout fails closed as unauthorized.
#[derive(Clone)]
pub struct ScopeLoader {
    credentials: Arc<dyn CredentialStore>,
    timeout: Duration,
}

impl ScopeLoader {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            credentials,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn resolve_scope(&self, identity: &Identity) -> Result<Scope, AccessError> {
        let lookup = self.credentials.find_user(&identity.user_id);
        let user = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(user_id = %identity.user_id, timeout_ms = self.timeout.as_millis() as u64, "scope lookup timed out");
                return Err(AccessError::Unauthorized("scope lookup timed out".to_string()));
            }
        };

        let Some(user) = user else {
            return Err(AccessError::Unauthorized("unknown user".to_string()));
        };
        if !user.is_active {
            return Err(AccessError::Unauthorized("user is deactivated".to_string()));
        }
        if user.role != identity.role {
            debug!(
                user_id = %user.id,
                token_role = %identity.role,
                stored_role = %user.role,
                "token role differs from stored role; using stored role"
            );
        }

        Ok(scope_from_user(user))
    }
}

/// Active branches plus every assigned WhatsApp account.
fn scope_from_user(user: UserRecord) -> Scope {
    let branches: Vec<BranchId> = user
        .branches
        .into_iter()
        .filter(|b| b.is_active)
        .map(|b| b.id)
        .collect();
    let accounts: Vec<WhatsAppAccountId> = user.whatsapp_accounts.into_iter().map(|a| a.id).collect();
    Scope::new(user.id, user.role, branches, accounts)
}
