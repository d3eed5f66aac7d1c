use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info};

use chatdesk_auth::{AuditRecord, PermissionTable, Scope, decide_delete};
use chatdesk_core::{EntityType, RecordId};

use super::AccessError;
use crate::store::AuditSink;

/// Decides delete attempts and records every one of them.
///
/// The audit write runs on its own task and is awaited before the decision
/// is returned, so it completes even if the request future is dropped. A
/// failed write is logged and does not change the decision. The guard waits
/// at most `audit_timeout` for the write; a slower write keeps running on its
/// task while the decision is returned.
#[derive(Clone)]
pub struct DeleteGuard {
    permissions: Arc<PermissionTable>,
    audit: Arc<dyn AuditSink>,
    audit_timeout: Duration,
}

impl DeleteGuard {
    pub const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(permissions: Arc<PermissionTable>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            permissions,
            audit,
            audit_timeout: Self::DEFAULT_AUDIT_TIMEOUT,
        }
    }

    pub fn with_audit_timeout(mut self, audit_timeout: Duration) -> Self {
        self.audit_timeout = audit_timeout;
        self
    }

    /// Decide, audit, then return the scope on grant or `Forbidden` on denial.
    ///
    /// `prior_state` is the entity's snapshot (see `chatdesk_auth::snapshot`),
    /// `null` when the target does not exist.
    pub async fn authorize_delete(
        &self,
        scope: Scope,
        entity: EntityType,
        entity_id: RecordId,
        prior_state: Value,
    ) -> Result<Scope, AccessError> {
        let decision = decide_delete(&self.permissions, &scope, entity);
        let record = AuditRecord::for_delete(&scope, entity, entity_id, prior_state, &decision, Utc::now());
        self.record(record).await;

        match decision.reason() {
            None => Ok(scope),
            Some(reason) => {
                info!(user_id = %scope.user_id, role = %scope.role, entity = %entity, reason, "delete denied");
                Err(AccessError::Forbidden(reason.to_string()))
            }
        }
    }

    async fn record(&self, record: AuditRecord) {
        let audit_id = record.id;
        let sink = Arc::clone(&self.audit);
        let write = tokio::spawn(async move { sink.append(record).await });

        match tokio::time::timeout(self.audit_timeout, write).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!(%audit_id, error = %e, "failed to write audit record"),
            Ok(Err(e)) => error!(%audit_id, error = %e, "audit write task failed"),
            Err(_) => error!(
                %audit_id,
                timeout_ms = self.audit_timeout.as_millis() as u64,
                "audit write still pending; returning decision"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAuditSink;
    use chatdesk_auth::{AuditOutcome, Role};
    use chatdesk_core::UserId;
    use serde_json::json;

    fn guard(sink: Arc<InMemoryAuditSink>) -> DeleteGuard {
        DeleteGuard::new(Arc::new(PermissionTable::standard()), sink)
    }

    fn scope(role: Role) -> Scope {
        Scope::bare(UserId::new("u1"), role)
    }

    #[tokio::test]
    async fn denial_is_audited_with_prior_state() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let prior = json!({ "name": "welcome", "category": "MARKETING" });

        let err = guard(sink.clone())
            .authorize_delete(scope(Role::Supervisor), EntityType::Template, RecordId::new("t1"), prior.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Forbidden(_)));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Denied);
        assert_eq!(records[0].prior_state, prior);
        assert_eq!(records[0].entity_id, RecordId::new("t1"));
    }

    #[tokio::test]
    async fn repeated_attempts_produce_one_record_each() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let g = guard(sink.clone());

        for _ in 0..2 {
            g.authorize_delete(scope(Role::Admin), EntityType::Booking, RecordId::new("bk1"), Value::Null)
                .await
                .unwrap();
        }

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.outcome == AuditOutcome::Granted));
        assert_ne!(records[0].id, records[1].id);
    }

    #[tokio::test]
    async fn audit_failure_does_not_change_the_decision() {
        let sink = Arc::new(InMemoryAuditSink::new());
        sink.set_failing(true);
        let g = guard(sink.clone());

        assert!(
            g.authorize_delete(scope(Role::Admin), EntityType::Contact, RecordId::new("c1"), Value::Null)
                .await
                .is_ok()
        );
        assert!(matches!(
            g.authorize_delete(scope(Role::Agent), EntityType::Contact, RecordId::new("c1"), Value::Null)
                .await,
            Err(AccessError::Forbidden(_))
        ));
        assert!(sink.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn write_in_flight_completes_after_request_is_dropped() {
        let sink = Arc::new(InMemoryAuditSink::new());
        sink.set_latency(Some(Duration::from_millis(200)));
        let g = guard(sink.clone());

        let attempt = g.authorize_delete(scope(Role::Admin), EntityType::Booking, RecordId::new("bk1"), Value::Null);
        assert!(tokio::time::timeout(Duration::from_millis(20), attempt).await.is_err());
        assert!(sink.records().is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_id, RecordId::new("bk1"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_audit_write_does_not_hold_the_decision() {
        let sink = Arc::new(InMemoryAuditSink::new());
        sink.set_latency(Some(Duration::from_secs(3600)));
        let g = guard(sink.clone()).with_audit_timeout(Duration::from_millis(50));

        let granted = tokio::time::timeout(
            Duration::from_secs(1),
            g.authorize_delete(scope(Role::Admin), EntityType::Contact, RecordId::new("c1"), Value::Null),
        )
        .await
        .expect("decision returned within the audit timeout");
        assert!(granted.is_ok());

        let denied = tokio::time::timeout(
            Duration::from_secs(1),
            g.authorize_delete(scope(Role::Agent), EntityType::Contact, RecordId::new("c1"), Value::Null),
        )
        .await
        .expect("decision returned within the audit timeout");
        assert!(matches!(denied, Err(AccessError::Forbidden(_))));
    }
}
