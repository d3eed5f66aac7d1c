use axum::{Extension, Router, routing::get};

use chatdesk_core::EntityType;

pub mod anchors;
pub mod audit;
pub mod bot_flows;
pub mod rbac;
pub mod records;
pub mod system;
pub mod templates;

/// Router for all authenticated endpoints.
///
/// Each entity collection is mounted at its collection path with its
/// `EntityType` attached as a request extension.
pub fn router() -> Router {
    let mut router = Router::new()
        .route("/whoami", get(system::whoami))
        .route("/audit", get(audit::recent))
        .nest("/rbac", rbac::router());

    for entity in EntityType::ALL {
        let collection = match entity {
            EntityType::BotFlow => bot_flows::router(),
            EntityType::Template => templates::router(),
            _ => records::router(),
        };
        router = router.nest(&format!("/{}", entity.collection()), collection.layer(Extension(entity)));
    }
    router
}
