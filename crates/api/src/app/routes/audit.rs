use std::sync::Arc;

use axum::{
    extract::{Extension, Query, rejection::QueryRejection},
    response::Response,
};

use chatdesk_auth::{Identity, capabilities};

use crate::app::dto::AuditQuery;
use crate::app::errors::{self, ApiError};
use crate::app::services::AppServices;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// GET /audit?limit=N (requires `view_audit_log`), newest first.
pub async fn recent(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let scope = services.gate.require_auth_with_scope(&identity).await?;
    services
        .gate
        .require_capability(&scope, capabilities::VIEW_AUDIT_LOG.as_str())?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let records = services.audit.recent(limit).await?;
    Ok(errors::ok(records))
}
