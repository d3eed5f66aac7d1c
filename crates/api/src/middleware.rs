use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::app::errors::ApiError;
use crate::authz::Gate;

/// Verify the bearer token and attach the caller's `Identity` to the request.
///
/// Only the token is checked here; scope is resolved per handler so that
/// every check sees fresh memberships.
pub async fn auth_middleware(
    State(gate): State<Arc<Gate>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = gate.require_auth(req.headers())?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
