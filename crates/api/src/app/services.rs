//! Store and gate wiring.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use chatdesk_auth::{Hs256TokenVerifier, PermissionTable};
use chatdesk_infra::{
    AuditSink, CredentialStore, DeleteGuard, EntityStore, InMemoryAuditSink, InMemoryCredentialStore,
    InMemoryEntityStore, PostgresAuditSink, PostgresCredentialStore, PostgresEntityStore, ScopeLoader, apply_schema,
};

use crate::authz::Gate;
use crate::config::{ApiConfig, StoreBackend};

/// Everything handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub gate: Arc<Gate>,
    pub entities: Arc<dyn EntityStore>,
    pub audit: Arc<dyn AuditSink>,
}

/// The three stores the engine talks to.
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub entities: Arc<dyn EntityStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            credentials: Arc::new(InMemoryCredentialStore::new()),
            entities: Arc::new(InMemoryEntityStore::new()),
            audit: Arc::new(InMemoryAuditSink::new()),
        }
    }

    pub async fn postgres(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("failed to connect to DATABASE_URL")?;
        apply_schema(&pool).await.context("failed to apply schema")?;

        Ok(Self {
            credentials: Arc::new(PostgresCredentialStore::new(pool.clone())),
            entities: Arc::new(PostgresEntityStore::new(pool.clone())),
            audit: Arc::new(PostgresAuditSink::new(pool)),
        })
    }
}

impl AppServices {
    /// Wire the gate over `stores`. The permission table is built once here
    /// and never changes afterwards.
    pub fn new(config: &ApiConfig, stores: Stores) -> Self {
        let permissions = Arc::new(PermissionTable::standard());
        let verifier = Arc::new(Hs256TokenVerifier::new(config.jwt_secret.as_bytes()));
        let loader = ScopeLoader::new(stores.credentials).with_timeout(config.scope_load_timeout);
        let delete_guard =
            DeleteGuard::new(permissions.clone(), stores.audit.clone()).with_audit_timeout(config.audit_write_timeout);

        Self {
            gate: Arc::new(Gate::new(verifier, loader, permissions, delete_guard)),
            entities: stores.entities,
            audit: stores.audit,
        }
    }
}

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let stores = match &config.store {
        StoreBackend::InMemory => {
            info!("using in-memory stores");
            Stores::in_memory()
        }
        StoreBackend::Postgres { database_url } => {
            info!("using postgres stores");
            Stores::postgres(database_url).await?
        }
    };
    Ok(AppServices::new(config, stores))
}
