//! Handler-facing authorization gate.
//!
//! Every check starts from the token: [`Gate::require_auth`] verifies it
//! without touching a store, then the scope-bearing checks reload the
//! actor's scope fresh before any role or capability test runs. The gate
//! proves role and capability only; per-row ownership is left to handlers,
//! which apply the entity's scope predicate.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use chatdesk_auth::{Identity, PermissionTable, Role, Scope, TokenError, TokenVerifier, require_capability, require_role};
use chatdesk_core::{EntityType, RecordId};
use chatdesk_infra::{DeleteGuard, ScopeLoader};

use crate::app::errors::ApiError;

pub struct Gate {
    verifier: Arc<dyn TokenVerifier>,
    loader: ScopeLoader,
    permissions: Arc<PermissionTable>,
    delete_guard: DeleteGuard,
}

impl Gate {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        loader: ScopeLoader,
        permissions: Arc<PermissionTable>,
        delete_guard: DeleteGuard,
    ) -> Self {
        Self {
            verifier,
            loader,
            permissions,
            delete_guard,
        }
    }

    pub fn permissions(&self) -> &PermissionTable {
        &self.permissions
    }

    /// Verify the bearer token. No store access.
    pub fn require_auth(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        let token = extract_bearer(headers)?;
        self.verifier.verify(token, Utc::now()).map_err(|e| {
            info!(reason = %e, "rejected bearer token");
            ApiError::from(e)
        })
    }

    /// Resolve the authenticated actor's current scope.
    pub async fn require_auth_with_scope(&self, identity: &Identity) -> Result<Scope, ApiError> {
        self.loader.resolve_scope(identity).await.map_err(|e| {
            info!(user_id = %identity.user_id, error = %e, "scope resolution failed");
            ApiError::from(e)
        })
    }

    pub async fn require_role_with_scope(&self, identity: &Identity, allowed: &[Role]) -> Result<Scope, ApiError> {
        let scope = self.require_auth_with_scope(identity).await?;
        require_role(&scope, allowed).map_err(|e| {
            info!(user_id = %scope.user_id, role = %scope.role, "role check failed");
            ApiError::from(e)
        })?;
        Ok(scope)
    }

    pub fn require_capability(&self, scope: &Scope, capability: &str) -> Result<(), ApiError> {
        require_capability(&self.permissions, scope, capability).map_err(|e| {
            info!(user_id = %scope.user_id, role = %scope.role, capability, "capability check failed");
            ApiError::from(e)
        })
    }

    /// Resolve scope, decide, audit, and only then hand the scope back.
    ///
    /// `prior_state` must be captured by the caller before this call and
    /// before any mutation.
    pub async fn require_delete_allowed(
        &self,
        identity: &Identity,
        entity: EntityType,
        entity_id: RecordId,
        prior_state: Value,
    ) -> Result<Scope, ApiError> {
        let scope = self.require_auth_with_scope(identity).await?;
        Ok(self
            .delete_guard
            .authorize_delete(scope, entity, entity_id, prior_state)
            .await?)
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(TokenError::Missing)?;

    let header = header.to_str().map_err(|_| TokenError::Malformed)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(TokenError::Malformed)?
        .trim();
    if token.is_empty() {
        return Err(TokenError::Missing.into());
    }

    Ok(token)
}
