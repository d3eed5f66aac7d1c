//! `chatdesk-core`: shared domain primitives.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::EntityType;
pub use error::{DomainError, DomainResult};
pub use id::{BranchId, RecordId, UserId, WhatsAppAccountId};
