//! Postgres-backed stores.
//!
//! ## Layout
//!
//! - `users`, `branches`, `whatsapp_accounts` and the two membership tables
//!   back [`PostgresCredentialStore`]
//! - `scoped_records(entity_type, id, doc jsonb)` backs [`PostgresEntityStore`];
//!   scope filters are translated by [`super::sql::push_predicate`]
//! - `audit_records` backs [`PostgresAuditSink`] (insert-only)
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Database` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | Other | N/A | `Database` |

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use chatdesk_auth::{AuditAction, AuditOutcome, AuditRecord, Predicate, Role};
use chatdesk_core::{BranchId, EntityType, RecordId, UserId, WhatsAppAccountId};

use super::sql::push_predicate;
use super::{
    AccountMembership, AuditSink, BranchMembership, CredentialStore, EntityStore, StoreError, UserRecord,
    document_id, merge_patch,
};

const SCHEMA: &str = include_str!("../../migrations/0001_access_control.sql");

/// Create all tables and indexes if they do not exist yet.
#[instrument(skip(pool), err)]
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_user(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        let Some(row) = sqlx::query("SELECT id, email, role, is_active FROM users WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?
        else {
            return Ok(None);
        };

        let role: String = row.try_get("role").map_err(|e| map_sqlx_error("find_user", e))?;
        let role = Role::from_str(&role).map_err(|e| StoreError::InvalidRecord(e.to_string()))?;

        let branches = sqlx::query(
            r#"
            SELECT b.id, b.name, b.is_active
            FROM user_branches ub
            JOIN branches b ON b.id = ub.branch_id
            WHERE ub.user_id = $1
            ORDER BY b.id
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_branches", e))?
        .into_iter()
        .map(|r| -> Result<BranchMembership, sqlx::Error> {
            Ok(BranchMembership {
                id: BranchId::new(r.try_get::<String, _>("id")?),
                name: r.try_get("name")?,
                is_active: r.try_get("is_active")?,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sqlx_error("find_user_branches", e))?;

        let whatsapp_accounts = sqlx::query(
            r#"
            SELECT wa.id, wa.branch_id
            FROM user_whatsapp_accounts uwa
            JOIN whatsapp_accounts wa ON wa.id = uwa.whatsapp_account_id
            WHERE uwa.user_id = $1
            ORDER BY wa.id
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_accounts", e))?
        .into_iter()
        .map(|r| -> Result<AccountMembership, sqlx::Error> {
            Ok(AccountMembership {
                id: WhatsAppAccountId::new(r.try_get::<String, _>("id")?),
                branch_id: r.try_get::<Option<String>, _>("branch_id")?.map(BranchId::new),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sqlx_error("find_user_accounts", e))?;

        Ok(Some(UserRecord {
            id: UserId::new(row.try_get::<String, _>("id").map_err(|e| map_sqlx_error("find_user", e))?),
            email: row.try_get("email").map_err(|e| map_sqlx_error("find_user", e))?,
            role,
            is_active: row.try_get("is_active").map_err(|e| map_sqlx_error("find_user", e))?,
            branches,
            whatsapp_accounts,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoped records
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresEntityStore {
    pool: Arc<PgPool>,
}

impl PostgresEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn scoped_query<'a>(prefix: &str, entity: EntityType, id: Option<&RecordId>, filter: &Predicate) -> Result<QueryBuilder<'a, Postgres>, StoreError> {
    let mut qb = QueryBuilder::<Postgres>::new(prefix);
    qb.push(" WHERE entity_type = ");
    qb.push_bind(entity.as_str());
    if let Some(id) = id {
        qb.push(" AND id = ");
        qb.push_bind(id.as_str().to_string());
    }
    qb.push(" AND ");
    push_predicate(&mut qb, "doc", filter)?;
    Ok(qb)
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    #[instrument(skip(self, filter), fields(entity = %entity), err)]
    async fn find_many(&self, entity: EntityType, filter: &Predicate) -> Result<Vec<Value>, StoreError> {
        if filter.is_nothing() {
            return Ok(Vec::new());
        }
        let mut qb = scoped_query("SELECT doc FROM scoped_records", entity, None, filter)?;
        qb.push(" ORDER BY id");
        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_many", e))?;
        rows.iter()
            .map(|r| r.try_get::<Value, _>("doc").map_err(|e| map_sqlx_error("find_many", e)))
            .collect()
    }

    #[instrument(skip(self, filter), fields(entity = %entity, id = %id), err)]
    async fn find_one(
        &self,
        entity: EntityType,
        id: &RecordId,
        filter: &Predicate,
    ) -> Result<Option<Value>, StoreError> {
        let mut qb = scoped_query("SELECT doc FROM scoped_records", entity, Some(id), filter)?;
        let row = qb
            .build()
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_one", e))?;
        row.map(|r| r.try_get::<Value, _>("doc"))
            .transpose()
            .map_err(|e| map_sqlx_error("find_one", e))
    }

    #[instrument(skip(self, record), fields(entity = %entity), err)]
    async fn insert(&self, entity: EntityType, record: Value) -> Result<Value, StoreError> {
        let id = document_id(&record)?;
        let row = sqlx::query("INSERT INTO scoped_records (entity_type, id, doc) VALUES ($1, $2, $3) RETURNING doc")
            .bind(entity.as_str())
            .bind(id.as_str())
            .bind(&record)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;
        row.try_get("doc").map_err(|e| map_sqlx_error("insert", e))
    }

    #[instrument(skip(self, filter, patch), fields(entity = %entity, id = %id), err)]
    async fn update(
        &self,
        entity: EntityType,
        id: &RecordId,
        filter: &Predicate,
        patch: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let mut patch_doc = Value::Object(Map::new());
        merge_patch(&mut patch_doc, patch);

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE scoped_records SET doc = doc || ");
        qb.push_bind(patch_doc);
        qb.push(" WHERE entity_type = ");
        qb.push_bind(entity.as_str());
        qb.push(" AND id = ");
        qb.push_bind(id.as_str().to_string());
        qb.push(" AND ");
        push_predicate(&mut qb, "doc", filter)?;
        qb.push(" RETURNING doc");

        let row = qb
            .build()
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update", e))?
            .ok_or(StoreError::NotFound)?;
        row.try_get("doc").map_err(|e| map_sqlx_error("update", e))
    }

    #[instrument(skip(self, filter), fields(entity = %entity, id = %id), err)]
    async fn delete(&self, entity: EntityType, id: &RecordId, filter: &Predicate) -> Result<(), StoreError> {
        let mut qb = scoped_query("DELETE FROM scoped_records", entity, Some(id), filter)?;
        let result = qb
            .build()
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresAuditSink {
    pool: Arc<PgPool>,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    #[instrument(skip(self, record), fields(audit_id = %record.id, outcome = record.outcome.as_str()), err)]
    async fn append(&self, record: AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_records (
                id, actor_id, actor_role, entity_type, entity_id,
                action, prior_state, occurred_at, outcome, reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id)
        .bind(record.actor_id.as_str())
        .bind(record.actor_role.as_str())
        .bind(record.entity_type.as_str())
        .bind(record.entity_id.as_str())
        .bind(record.action.as_str())
        .bind(&record.prior_state)
        .bind(record.timestamp)
        .bind(record.outcome.as_str())
        .bind(record.reason.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_audit", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, actor_role, entity_type, entity_id,
                   action, prior_state, occurred_at, outcome, reason
            FROM audit_records
            ORDER BY occurred_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent_audit", e))?;

        rows.iter().map(audit_from_row).collect()
    }
}

fn audit_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditRecord, StoreError> {
    let get_str = |col: &str| -> Result<String, StoreError> {
        row.try_get::<String, _>(col).map_err(|e| map_sqlx_error("decode_audit", e))
    };
    let invalid = |e: chatdesk_core::DomainError| StoreError::InvalidRecord(e.to_string());

    let action = match get_str("action")?.as_str() {
        "delete" => AuditAction::Delete,
        other => return Err(StoreError::InvalidRecord(format!("unknown audit action '{other}'"))),
    };
    let outcome = match get_str("outcome")?.as_str() {
        "GRANTED" => AuditOutcome::Granted,
        "DENIED" => AuditOutcome::Denied,
        other => return Err(StoreError::InvalidRecord(format!("unknown audit outcome '{other}'"))),
    };

    Ok(AuditRecord {
        id: row.try_get::<Uuid, _>("id").map_err(|e| map_sqlx_error("decode_audit", e))?,
        actor_id: UserId::new(get_str("actor_id")?),
        actor_role: Role::from_str(&get_str("actor_role")?).map_err(invalid)?,
        entity_type: EntityType::from_str(&get_str("entity_type")?).map_err(invalid)?,
        entity_id: RecordId::new(get_str("entity_id")?),
        action,
        prior_state: row
            .try_get::<Option<Value>, _>("prior_state")
            .map_err(|e| map_sqlx_error("decode_audit", e))?
            .unwrap_or(Value::Null),
        timestamp: row
            .try_get::<DateTime<Utc>, _>("occurred_at")
            .map_err(|e| map_sqlx_error("decode_audit", e))?,
        outcome,
        reason: row
            .try_get::<Option<String>, _>("reason")
            .map_err(|e| map_sqlx_error("decode_audit", e))?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {}: {}", operation, e)),
        other => StoreError::Database(format!("sqlx error in {}: {}", operation, other)),
    }
}
