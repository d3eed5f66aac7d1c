//! RBAC endpoints for transparent authorization debugging.
//!
//! These answer "why was this request denied?" for the caller's own role,
//! and list the static permission table for user administrators.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Query, rejection::QueryRejection},
    response::Response,
    routing::get,
};
use serde_json::json;

use chatdesk_auth::{Identity, capabilities, explain_capability};

use crate::app::dto::ExplainQuery;
use crate::app::errors::{self, ApiError};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/explain", get(explain))
        .route("/capabilities", get(list_capabilities))
}

/// GET /rbac/explain?capability=X
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<ExplainQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let scope = services.gate.require_auth_with_scope(&identity).await?;
    let explanation = explain_capability(services.gate.permissions(), &scope, &query.capability);
    Ok(errors::ok(explanation))
}

/// GET /rbac/capabilities (requires `manage_users`)
pub async fn list_capabilities(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, ApiError> {
    let scope = services.gate.require_auth_with_scope(&identity).await?;
    services
        .gate
        .require_capability(&scope, capabilities::MANAGE_USERS.as_str())?;

    let table: Vec<_> = services
        .gate
        .permissions()
        .iter()
        .map(|(capability, roles)| json!({ "capability": capability.as_str(), "roles": roles }))
        .collect();
    Ok(errors::ok(table))
}
