//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store wiring and the authorization gate
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs
//! - `errors.rs`: the JSON success/error envelope

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let services = services::build_services(config).await?;
    Ok(build_router(Arc::new(services)))
}

/// Router over already-wired services (tests seed the stores first).
pub fn build_router(services: Arc<AppServices>) -> Router {
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(
                services.gate.clone(),
                middleware::auth_middleware,
            ))
            .layer(Extension(services)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}

pub use services::{AppServices, Stores};
