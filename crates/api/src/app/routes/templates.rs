use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    response::Response,
    routing::get,
};
use serde_json::{Value, json};
use tracing::info;

use chatdesk_auth::{Identity, capabilities};
use chatdesk_core::{EntityType, WhatsAppAccountId};

use crate::app::dto::CreateTemplateRequest;
use crate::app::errors::{self, ApiError};
use crate::app::routes::anchors::{non_blank, record_id, require_anchor_in_scope};
use crate::app::routes::records;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(records::list_records).post(create_template))
        .route(
            "/:id",
            get(records::get_record)
                .patch(records::update_record)
                .delete(records::delete_record),
        )
}

/// POST /templates
///
/// Requires `create_template`. Templates are scoped by WhatsApp account, so
/// a non-ADMIN creator must name one of their own accounts.
pub async fn create_template(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    body: Result<Json<CreateTemplateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let scope = services.gate.require_auth_with_scope(&identity).await?;
    services
        .gate
        .require_capability(&scope, capabilities::CREATE_TEMPLATE.as_str())?;

    if body.name.trim().is_empty() || body.category.trim().is_empty() {
        return Err(ApiError::bad_request("name and category must not be empty"));
    }

    let account_id = non_blank(body.whatsapp_account_id).map(WhatsAppAccountId::new);
    require_anchor_in_scope(&scope, "template", None, account_id.as_ref())?;

    let id = record_id(body.id);
    let doc = json!({
        "id": id,
        "name": body.name,
        "category": body.category,
        "body": body.body,
        "whatsappAccountId": account_id,
        "createdById": scope.user_id,
    });

    let created: Value = services.entities.insert(EntityType::Template, doc).await?;
    info!(user_id = %scope.user_id, entity_id = %id, "template created");
    Ok(errors::created(created))
}
