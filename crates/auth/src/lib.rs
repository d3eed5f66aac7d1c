//! `chatdesk-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it verifies
//! tokens, builds row filters from a resolved [`Scope`], checks roles and
//! capabilities, and decides destructive operations. Loading scopes and
//! writing audit records live in `chatdesk-infra`.

pub mod audit;
pub mod authorize;
pub mod claims;
pub mod filters;
pub mod permissions;
pub mod predicate;
pub mod principal;
pub mod roles;
pub mod scope;
pub mod token;

pub use audit::{AuditAction, AuditOutcome, AuditRecord, DeleteDecision, decide_delete, snapshot};
pub use authorize::{AuthzError, CapabilityExplanation, explain_capability, require_capability, require_role};
pub use claims::{CLOCK_SKEW_SECS, JwtClaims, TokenError, validate_claims};
pub use filters::{
    Anchor, EntityScopeSpec, build_booking_scope_filter, build_bot_flow_scope_filter,
    build_contact_scope_filter, build_conversation_scope_filter, build_scope_filter,
    build_template_scope_filter, build_whatsapp_account_scope_filter, scope_spec,
};
pub use permissions::{Capability, DEFAULT_GRANTS, PermissionTable, capabilities, has_permission};
pub use predicate::{Field, Predicate};
pub use principal::Identity;
pub use roles::Role;
pub use scope::Scope;
pub use token::{Hs256TokenVerifier, TokenVerifier};
