use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response};
use serde_json::json;

use chatdesk_auth::Identity;

use crate::app::errors::{self, ApiError};
use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// The caller's freshly resolved scope.
pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, ApiError> {
    let scope = services.gate.require_auth_with_scope(&identity).await?;
    Ok(errors::ok(json!({
        "userId": scope.user_id,
        "email": identity.email,
        "role": scope.role,
        "branchIds": scope.branch_ids,
        "whatsappAccountIds": scope.whatsapp_account_ids,
    })))
}
