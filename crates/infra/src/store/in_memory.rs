use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use chatdesk_auth::{AuditRecord, Predicate};
use chatdesk_core::{EntityType, RecordId, UserId};

use super::{AuditSink, CredentialStore, EntityStore, StoreError, UserRecord, document_id, merge_patch};

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

/// In-memory credential store for tests/dev.
///
/// Counts lookups and can simulate a slow or unavailable backend.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<UserId, UserRecord>>,
    lookups: AtomicUsize,
    latency: Mutex<Option<Duration>>,
    unavailable: AtomicBool,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let store = Self::new();
        for user in users {
            store.upsert(user);
        }
        store
    }

    pub fn upsert(&self, user: UserRecord) {
        if let Ok(mut map) = self.users.write() {
            map.insert(user.id.clone(), user);
        }
    }

    /// Number of `find_user` calls served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Delay every lookup by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = latency;
        }
    }

    /// Make every lookup fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock().map_err(|_| poisoned())?;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("credential store offline".to_string()));
        }

        let map = self.users.read().map_err(|_| poisoned())?;
        Ok(map.get(id).cloned())
    }
}

/// In-memory document store for tests/dev.
///
/// Filters are evaluated with [`Predicate::matches`], the same semantics the
/// Postgres translation implements in SQL.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    records: RwLock<BTreeMap<(EntityType, RecordId), Value>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, bypassing duplicate checks (fixtures).
    pub fn seed(&self, entity: EntityType, record: Value) -> Result<(), StoreError> {
        let id = document_id(&record)?;
        let mut map = self.records.write().map_err(|_| poisoned())?;
        map.insert((entity, id), record);
        Ok(())
    }

    pub fn len(&self, entity: EntityType) -> usize {
        self.records
            .read()
            .map(|m| m.keys().filter(|(e, _)| *e == entity).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn find_many(&self, entity: EntityType, filter: &Predicate) -> Result<Vec<Value>, StoreError> {
        if filter.is_nothing() {
            return Ok(Vec::new());
        }
        let map = self.records.read().map_err(|_| poisoned())?;
        Ok(map
            .iter()
            .filter(|((e, _), doc)| *e == entity && filter.matches(doc))
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn find_one(
        &self,
        entity: EntityType,
        id: &RecordId,
        filter: &Predicate,
    ) -> Result<Option<Value>, StoreError> {
        let map = self.records.read().map_err(|_| poisoned())?;
        Ok(map
            .get(&(entity, id.clone()))
            .filter(|doc| filter.matches(doc))
            .cloned())
    }

    async fn insert(&self, entity: EntityType, record: Value) -> Result<Value, StoreError> {
        let id = document_id(&record)?;
        let mut map = self.records.write().map_err(|_| poisoned())?;
        let key = (entity, id);
        if map.contains_key(&key) {
            return Err(StoreError::Conflict(format!("{} {} already exists", entity, key.1)));
        }
        map.insert(key, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        entity: EntityType,
        id: &RecordId,
        filter: &Predicate,
        patch: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let mut map = self.records.write().map_err(|_| poisoned())?;
        let doc = map
            .get_mut(&(entity, id.clone()))
            .filter(|doc| filter.matches(doc))
            .ok_or(StoreError::NotFound)?;
        merge_patch(doc, patch);
        Ok(doc.clone())
    }

    async fn delete(&self, entity: EntityType, id: &RecordId, filter: &Predicate) -> Result<(), StoreError> {
        let mut map = self.records.write().map_err(|_| poisoned())?;
        let key = (entity, id.clone());
        match map.get(&key) {
            Some(doc) if filter.matches(doc) => {
                map.remove(&key);
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }
}

/// In-memory audit sink for tests/dev. Can simulate slow or failing writes.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every append by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = latency;
        }
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<(), StoreError> {
        let latency = *self.latency.lock().map_err(|_| poisoned())?;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit sink offline".to_string()));
        }
        self.records.lock().map_err(|_| poisoned())?.push(record);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| poisoned())?;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}
