//! Delete decisions and the audit record model.
//!
//! The decision is pure; writing the record is the caller's job (see the
//! infra delete guard), which must happen before any mutation runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use chatdesk_core::{EntityType, RecordId, UserId};

use crate::{Capability, PermissionTable, Role, Scope};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Granted,
    Denied,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Granted => "GRANTED",
            AuditOutcome::Denied => "DENIED",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Delete => "delete",
        }
    }
}

/// Immutable, append-only proof of a destructive attempt and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub entity_type: EntityType,
    pub entity_id: RecordId,
    pub action: AuditAction,
    pub prior_state: Value,
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub reason: Option<String>,
}

impl AuditRecord {
    pub fn for_delete(
        scope: &Scope,
        entity_type: EntityType,
        entity_id: RecordId,
        prior_state: Value,
        decision: &DeleteDecision,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            actor_id: scope.user_id.clone(),
            actor_role: scope.role,
            entity_type,
            entity_id,
            action: AuditAction::Delete,
            prior_state,
            timestamp,
            outcome: decision.outcome(),
            reason: decision.reason().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteDecision {
    Granted,
    Denied { reason: String },
}

impl DeleteDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, DeleteDecision::Granted)
    }

    pub fn outcome(&self) -> AuditOutcome {
        match self {
            DeleteDecision::Granted => AuditOutcome::Granted,
            DeleteDecision::Denied { .. } => AuditOutcome::Denied,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            DeleteDecision::Granted => None,
            DeleteDecision::Denied { reason } => Some(reason),
        }
    }
}

/// Decide whether `scope` may delete rows of `entity`.
///
/// ADMIN is always allowed. Other roles are denied unless the permission
/// table explicitly marks the entity deletable for them (`delete_<entity>`).
pub fn decide_delete(table: &PermissionTable, scope: &Scope, entity: EntityType) -> DeleteDecision {
    if scope.is_admin() || table.is_deletable_by(scope.role, entity) {
        return DeleteDecision::Granted;
    }
    DeleteDecision::Denied {
        reason: format!(
            "role {} lacks capability '{}'",
            scope.role,
            Capability::delete(entity)
        ),
    }
}

/// Project a record onto the entity's snapshot fields.
///
/// Absent records snapshot to `null`; absent fields to `null` entries.
pub fn snapshot(entity: EntityType, record: Option<&Value>) -> Value {
    let Some(record) = record else {
        return Value::Null;
    };
    let mut out = Map::new();
    for field in entity.snapshot_fields() {
        out.insert(
            (*field).to_string(),
            record.get(*field).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}
