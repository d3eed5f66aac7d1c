//! Scoped CRUD over any entity collection.
//!
//! Reads and mutations always run with the caller's scope predicate, so an
//! out-of-scope record is indistinguishable from a missing one (404).

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Path,
        rejection::{JsonRejection, PathRejection},
    },
    response::Response,
    routing::get,
};
use serde_json::{Map, Value, json};
use tracing::info;

use chatdesk_auth::{Capability, Identity, Predicate, build_scope_filter, snapshot};
use chatdesk_core::{EntityType, RecordId};

use crate::app::errors::{self, ApiError};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_records))
        .route("/:id", get(get_record).patch(update_record).delete(delete_record))
}

pub async fn list_records(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(entity): Extension<EntityType>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, ApiError> {
    let scope = services.gate.require_auth_with_scope(&identity).await?;
    let filter = build_scope_filter(&scope, entity);
    let rows = services.entities.find_many(entity, &filter).await?;
    Ok(errors::ok(rows))
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(entity): Extension<EntityType>,
    Extension(identity): Extension<Identity>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = id?;
    let scope = services.gate.require_auth_with_scope(&identity).await?;
    let filter = build_scope_filter(&scope, entity);
    let row = services
        .entities
        .find_one(entity, &RecordId::new(id), &filter)
        .await?
        .ok_or_else(ApiError::not_found)?;
    Ok(errors::ok(row))
}

/// Merge a JSON object into an in-scope record.
///
/// Entities with an edit capability require it. Non-ADMIN callers may not
/// move a record outside their own scope with the patch.
pub async fn update_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(entity): Extension<EntityType>,
    Extension(identity): Extension<Identity>,
    id: Result<Path<String>, PathRejection>,
    patch: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = id?;
    let Json(patch) = patch?;
    let scope = services.gate.require_auth_with_scope(&identity).await?;
    if let Some(capability) = Capability::edit(entity) {
        services.gate.require_capability(&scope, capability.as_str())?;
    }

    let id = RecordId::new(id);
    let filter = build_scope_filter(&scope, entity);

    if !filter.is_all() {
        let mut preview = services
            .entities
            .find_one(entity, &id, &filter)
            .await?
            .ok_or_else(ApiError::not_found)?;
        if let Value::Object(doc) = &mut preview {
            doc.extend(patch.iter().filter(|(k, _)| k.as_str() != "id").map(|(k, v)| (k.clone(), v.clone())));
        }
        if !filter.matches(&preview) {
            info!(user_id = %scope.user_id, entity = %entity, entity_id = %id, "update would leave caller scope");
            return Err(ApiError::forbidden("update would move the record outside your scope"));
        }
    }

    let updated = services.entities.update(entity, &id, &filter, patch).await?;
    Ok(errors::ok(updated))
}

/// Audited delete.
///
/// The prior state comes from an unscoped read so that a denied attempt on
/// an out-of-scope record is still recorded with its snapshot. The caller
/// only ever sees the same 403 or 404 it would get for a missing record.
pub async fn delete_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(entity): Extension<EntityType>,
    Extension(identity): Extension<Identity>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = id?;
    let id = RecordId::new(id);

    let current = services.entities.find_one(entity, &id, &Predicate::all()).await?;
    let prior_state = snapshot(entity, current.as_ref());

    let scope = services
        .gate
        .require_delete_allowed(&identity, entity, id.clone(), prior_state)
        .await?;

    let filter = build_scope_filter(&scope, entity);
    services.entities.delete(entity, &id, &filter).await?;

    info!(user_id = %scope.user_id, entity = %entity, entity_id = %id, "record deleted");
    Ok(errors::ok(json!({ "id": id, "deleted": true })))
}
