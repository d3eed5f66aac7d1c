use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use chatdesk_auth::{AuthzError, TokenError};
use chatdesk_infra::{AccessError, StoreError};

/// Error response rendered as `{"success": false, "error": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not found")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "success": false,
                "error": self.message,
            })),
        )
            .into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::unauthorized(err.to_string())
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::forbidden(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::not_found(),
            StoreError::Conflict(msg) => ApiError::new(StatusCode::CONFLICT, msg),
            StoreError::InvalidRecord(msg) => ApiError::bad_request(msg),
            other => {
                error!(error = %other, "store failure");
                ApiError::internal()
            }
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unauthorized(msg) => ApiError::unauthorized(msg),
            AccessError::Forbidden(msg) => ApiError::forbidden(msg),
            AccessError::Store(e) => e.into(),
        }
    }
}

// Extractor rejections keep axum's status but use the JSON envelope.

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

/// `200 {"success": true, "data": ...}`
pub fn ok<T: Serialize>(data: T) -> Response {
    with_status(StatusCode::OK, data)
}

/// `201 {"success": true, "data": ...}`
pub fn created<T: Serialize>(data: T) -> Response {
    with_status(StatusCode::CREATED, data)
}

fn with_status<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_is_a_plain_404() {
        assert_eq!(ApiError::from(StoreError::NotFound), ApiError::not_found());
    }

    #[test]
    fn store_failures_are_internal_not_denials() {
        let err = ApiError::from(AccessError::Store(StoreError::Unavailable("db down".into())));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("db down"));
    }

    #[test]
    fn access_errors_map_to_401_and_403() {
        assert_eq!(
            ApiError::from(AccessError::Unauthorized("unknown user".into())).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AccessError::Forbidden("nope".into())).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::from(TokenError::Expired).status, StatusCode::UNAUTHORIZED);
    }
}
