//! Request-time access control: loading scopes and guarding deletes.

use thiserror::Error;

use crate::store::StoreError;

pub mod delete_guard;
pub mod scope_loader;

pub use delete_guard::DeleteGuard;
pub use scope_loader::ScopeLoader;

/// Outcome of an access check that did not grant the request.
///
/// `Store` is an infrastructure failure, never a denial; callers surface it
/// as an internal error.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
