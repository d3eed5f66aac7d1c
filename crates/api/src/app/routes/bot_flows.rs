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
use chatdesk_core::{BranchId, EntityType, WhatsAppAccountId};

use crate::app::dto::CreateBotFlowRequest;
use crate::app::errors::{self, ApiError};
use crate::app::routes::anchors::{non_blank, record_id, require_anchor_in_scope};
use crate::app::routes::records;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(records::list_records).post(create_bot_flow))
        .route(
            "/:id",
            get(records::get_record)
                .patch(records::update_record)
                .delete(records::delete_record),
        )
}

/// POST /bot-flows
///
/// Requires `create_bot_flow`. Non-ADMIN creators must anchor the flow to a
/// branch or account inside their own scope; unanchored flows are ADMIN-only.
pub async fn create_bot_flow(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    body: Result<Json<CreateBotFlowRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let scope = services.gate.require_auth_with_scope(&identity).await?;
    services
        .gate
        .require_capability(&scope, capabilities::CREATE_BOT_FLOW.as_str())?;

    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }

    let branch_id = non_blank(body.branch_id).map(BranchId::new);
    let account_id = non_blank(body.whatsapp_account_id).map(WhatsAppAccountId::new);
    require_anchor_in_scope(&scope, "bot flow", branch_id.as_ref(), account_id.as_ref())?;

    let id = record_id(body.id);
    let doc = json!({
        "id": id,
        "name": body.name,
        "description": body.description,
        "branchId": branch_id,
        "whatsappAccountId": account_id,
        "isActive": body.is_active,
        "createdById": scope.user_id,
    });

    let created: Value = services.entities.insert(EntityType::BotFlow, doc).await?;
    info!(user_id = %scope.user_id, entity_id = %id, "bot flow created");
    Ok(errors::created(created))
}
