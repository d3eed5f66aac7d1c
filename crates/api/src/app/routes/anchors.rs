//! Creation-time anchoring for records scoped by branch or WhatsApp account.

use tracing::info;

use chatdesk_auth::Scope;
use chatdesk_core::{BranchId, RecordId, WhatsAppAccountId};

use crate::app::errors::ApiError;

/// Drop blank optional strings so `""` is treated like an absent anchor.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Use the client-supplied id when present, otherwise mint one.
pub fn record_id(requested: Option<String>) -> RecordId {
    non_blank(requested).map_or_else(RecordId::generate, RecordId::new)
}

/// Non-ADMIN creators must anchor the new record, and every anchor they give
/// must be inside their scope. Unanchored records are ADMIN-only.
pub fn require_anchor_in_scope(
    scope: &Scope,
    kind: &str,
    branch_id: Option<&BranchId>,
    account_id: Option<&WhatsAppAccountId>,
) -> Result<(), ApiError> {
    if scope.is_admin() {
        return Ok(());
    }
    if branch_id.is_none() && account_id.is_none() {
        return Err(ApiError::forbidden(format!(
            "{kind} records without an anchor can only be created by ADMIN"
        )));
    }

    let branch_ok = branch_id.is_none_or(|b| scope.covers_branch(b));
    let account_ok = account_id.is_none_or(|a| scope.covers_account(a));
    if !(branch_ok && account_ok) {
        info!(user_id = %scope.user_id, kind, "anchor outside caller scope");
        return Err(ApiError::forbidden(format!(
            "{kind} must belong to one of your branches or accounts"
        )));
    }
    Ok(())
}
