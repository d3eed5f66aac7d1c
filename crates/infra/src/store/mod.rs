//! Storage seams for the access-control engine.
//!
//! Three traits cover everything the engine touches outside of process memory:
//!
//! - [`CredentialStore`]: users with their branch and WhatsApp-account memberships
//! - [`EntityStore`]: scoped CRM records (contacts, conversations, bookings, ...)
//! - [`AuditSink`]: append-only audit records for destructive attempts
//!
//! Each trait has an in-memory implementation (tests/dev) and a Postgres one.
//! Reads through [`EntityStore`] always take a [`Predicate`]; callers obtain it
//! from `chatdesk_auth::build_scope_filter`, so a store never decides scope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use chatdesk_auth::{AuditRecord, Predicate, Role};
use chatdesk_core::{BranchId, EntityType, RecordId, UserId, WhatsAppAccountId};

pub mod in_memory;
pub mod postgres;
pub mod sql;

pub use in_memory::{InMemoryAuditSink, InMemoryCredentialStore, InMemoryEntityStore};
pub use postgres::{PostgresAuditSink, PostgresCredentialStore, PostgresEntityStore, apply_schema};

/// Storage operation error.
///
/// These are infrastructure errors. They never encode an authorization
/// outcome: callers map them to "internal error", except [`StoreError::NotFound`]
/// which surfaces as a plain not-found.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record matched the id under the given filter.
    #[error("record not found")]
    NotFound,

    #[error("duplicate record: {0}")]
    Conflict(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A predicate could not be translated for this backend.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),
}

/// A branch membership as loaded from the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchMembership {
    pub id: BranchId,
    pub name: String,
    pub is_active: bool,
}

/// A WhatsApp account assignment as loaded from the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMembership {
    pub id: WhatsAppAccountId,
    pub branch_id: Option<BranchId>,
}

/// A user together with their memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub branches: Vec<BranchMembership>,
    pub whatsapp_accounts: Vec<AccountMembership>,
}

impl UserRecord {
    pub fn new(id: UserId, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            role,
            is_active: true,
            branches: Vec::new(),
            whatsapp_accounts: Vec::new(),
        }
    }

    pub fn with_branch(mut self, id: impl Into<BranchId>, name: impl Into<String>, is_active: bool) -> Self {
        self.branches.push(BranchMembership {
            id: id.into(),
            name: name.into(),
            is_active,
        });
        self
    }

    pub fn with_whatsapp_account(mut self, id: impl Into<WhatsAppAccountId>, branch_id: Option<BranchId>) -> Self {
        self.whatsapp_accounts.push(AccountMembership {
            id: id.into(),
            branch_id,
        });
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Source of truth for users and their memberships.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load a user and all their memberships, or `None` if the id is unknown.
    async fn find_user(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError>;
}

/// Scoped CRM records stored as JSON documents keyed by `(entity, id)`.
///
/// Every read and mutation takes a filter. Passing `Predicate::all()` is an
/// explicit unscoped access; the delete guard uses it to snapshot prior state.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// All records of `entity` matching `filter`, ordered by id.
    async fn find_many(&self, entity: EntityType, filter: &Predicate) -> Result<Vec<Value>, StoreError>;

    /// The record `id` if it exists and matches `filter`.
    async fn find_one(
        &self,
        entity: EntityType,
        id: &RecordId,
        filter: &Predicate,
    ) -> Result<Option<Value>, StoreError>;

    /// Insert a new record. The document must be an object with a string `id`.
    async fn insert(&self, entity: EntityType, record: Value) -> Result<Value, StoreError>;

    /// Merge `patch` into the record `id`, only if it matches `filter`.
    ///
    /// The `id` key of the patch is ignored. Returns [`StoreError::NotFound`]
    /// when nothing matched.
    async fn update(
        &self,
        entity: EntityType,
        id: &RecordId,
        filter: &Predicate,
        patch: Map<String, Value>,
    ) -> Result<Value, StoreError>;

    /// Delete the record `id`, only if it matches `filter`.
    ///
    /// Returns [`StoreError::NotFound`] when nothing matched, including the
    /// case where a concurrent delete already removed it.
    async fn delete(&self, entity: EntityType, id: &RecordId, filter: &Predicate) -> Result<(), StoreError>;
}

/// Append-only sink for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), StoreError>;

    /// Most recent records first.
    async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError>;
}

/// Read the string `id` of a JSON document.
pub(crate) fn document_id(record: &Value) -> Result<RecordId, StoreError> {
    match record.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(RecordId::new(id.clone())),
        Some(_) => Err(StoreError::InvalidRecord("`id` must be a non-empty string".to_string())),
        None => Err(StoreError::InvalidRecord("missing `id`".to_string())),
    }
}

/// Merge `patch` into `target` at the top level, never touching `id`.
pub(crate) fn merge_patch(target: &mut Value, patch: Map<String, Value>) {
    if let Value::Object(obj) = target {
        for (k, v) in patch {
            if k != "id" {
                obj.insert(k, v);
            }
        }
    }
}
