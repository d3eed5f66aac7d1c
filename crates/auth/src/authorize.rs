use serde::Serialize;
use thiserror::Error;

use chatdesk_core::UserId;

use crate::{PermissionTable, Role, Scope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role {role} is not allowed (requires one of {allowed})")]
    RoleNotAllowed { role: Role, allowed: String },

    #[error("forbidden: missing capability '{0}'")]
    MissingCapability(String),
}

/// Require that the actor's role is one of `allowed`.
///
/// - No IO
/// - No panics
/// - Proves role only, not per-row ownership
pub fn require_role(scope: &Scope, allowed: &[Role]) -> Result<(), AuthzError> {
    if allowed.contains(&scope.role) {
        return Ok(());
    }
    Err(AuthzError::RoleNotAllowed {
        role: scope.role,
        allowed: allowed
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Require that the actor's role holds `capability` in the permission table.
pub fn require_capability(
    table: &PermissionTable,
    scope: &Scope,
    capability: &str,
) -> Result<(), AuthzError> {
    if table.has_permission(scope.role, capability) {
        Ok(())
    } else {
        Err(AuthzError::MissingCapability(capability.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of a capability decision.
///
/// Answers "why was this request allowed/denied?" without exposing anything
/// beyond the caller's own role and the static permission table.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityExplanation {
    pub capability: String,
    pub granted: bool,
    pub reason: String,
    pub actor: ActorState,
    /// Roles that would be granted this capability.
    pub granting_roles: Vec<Role>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorState {
    pub user_id: UserId,
    pub role: Role,
    pub effective_capabilities: Vec<String>,
    pub branch_count: usize,
    pub whatsapp_account_count: usize,
}

pub fn explain_capability(
    table: &PermissionTable,
    scope: &Scope,
    capability: &str,
) -> CapabilityExplanation {
    let granting_roles = table.roles_for(capability);
    let granted = granting_roles.contains(&scope.role);

    let actor = ActorState {
        user_id: scope.user_id.clone(),
        role: scope.role,
        effective_capabilities: table
            .capabilities_of(scope.role)
            .into_iter()
            .map(|c| c.as_str().to_string())
            .collect(),
        branch_count: scope.branch_ids.len(),
        whatsapp_account_count: scope.whatsapp_account_ids.len(),
    };

    let (reason, suggestions) = if granted {
        (
            format!("Role {} is granted '{}'", scope.role, capability),
            Vec::new(),
        )
    } else if granting_roles.is_empty() {
        (
            format!("Capability '{}' is not defined in the permission table", capability),
            vec!["Check the capability name; unknown capabilities are denied for every role".to_string()],
        )
    } else {
        let roles = granting_roles
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        (
            format!("Role {} is not granted '{}'", scope.role, capability),
            vec![format!("Ask an administrator for one of the roles: {}", roles)],
        )
    };

    CapabilityExplanation {
        capability: capability.to_string(),
        granted,
        reason,
        actor,
        granting_roles,
        suggestions,
    }
}
