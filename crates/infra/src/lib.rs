//! Infrastructure layer: stores, scope loading and the delete guard.

pub mod access;
pub mod store;

pub use access::{AccessError, DeleteGuard, ScopeLoader};
pub use store::{
    AccountMembership, AuditSink, BranchMembership, CredentialStore, EntityStore, InMemoryAuditSink,
    InMemoryCredentialStore, InMemoryEntityStore, PostgresAuditSink, PostgresCredentialStore,
    PostgresEntityStore, StoreError, UserRecord, apply_schema,
};
