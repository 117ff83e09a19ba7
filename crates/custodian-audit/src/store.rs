use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use custodian_types::{AuditId, BatchId, EntityRef};

use crate::error::{AuditError, AuditResult};
use crate::record::AuditRecord;

/// Storage boundary for audit records.
///
/// Insert-only: the one permitted mutation is setting `deleted_at` through
/// [`mark_deleted`](Self::mark_deleted). Reads include soft-deleted rows.
pub trait AuditStore: Send + Sync {
    fn insert(&self, record: AuditRecord) -> AuditResult<()>;

    fn get(&self, id: AuditId) -> AuditResult<Option<AuditRecord>>;

    /// All records for an entity in write order.
    fn for_entity(&self, entity: &EntityRef) -> AuditResult<Vec<AuditRecord>>;

    fn by_batch(&self, batch_id: BatchId) -> AuditResult<Vec<AuditRecord>>;

    /// Records whose `parent_audit_id` is `parent`.
    fn children(&self, parent: AuditId) -> AuditResult<Vec<AuditRecord>>;

    fn created_before(&self, cutoff: DateTime<Utc>) -> AuditResult<Vec<AuditRecord>>;

    fn mark_deleted(&self, id: AuditId, at: DateTime<Utc>) -> AuditResult<()>;

    fn count(&self) -> AuditResult<usize>;
}

/// In-memory audit store for tests, demos, and embedding.
#[derive(Default)]
pub struct InMemoryAuditStore {
    inner: RwLock<AuditState>,
}

#[derive(Default)]
struct AuditState {
    records: Vec<AuditRecord>,
    by_id: HashMap<AuditId, usize>,
    by_entity: HashMap<EntityRef, Vec<usize>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AuditResult<std::sync::RwLockReadGuard<'_, AuditState>> {
        self.inner
            .read()
            .map_err(|_| AuditError::StoreError("audit read lock poisoned".into()))
    }

    fn write(&self) -> AuditResult<std::sync::RwLockWriteGuard<'_, AuditState>> {
        self.inner
            .write()
            .map_err(|_| AuditError::StoreError("audit write lock poisoned".into()))
    }

    fn filtered(&self, pred: impl Fn(&AuditRecord) -> bool) -> AuditResult<Vec<AuditRecord>> {
        let state = self.read()?;
        Ok(state.records.iter().filter(|r| pred(r)).cloned().collect())
    }
}

impl AuditStore for InMemoryAuditStore {
    fn insert(&self, record: AuditRecord) -> AuditResult<()> {
        let mut state = self.write()?;
        if state.by_id.contains_key(&record.id) {
            return Err(AuditError::DuplicateId(record.id));
        }
        let index = state.records.len();
        state.by_id.insert(record.id, index);
        state
            .by_entity
            .entry(record.entity_ref.clone())
            .or_default()
            .push(index);
        state.records.push(record);
        Ok(())
    }

    fn get(&self, id: AuditId) -> AuditResult<Option<AuditRecord>> {
        let state = self.read()?;
        Ok(state.by_id.get(&id).map(|&i| state.records[i].clone()))
    }

    fn for_entity(&self, entity: &EntityRef) -> AuditResult<Vec<AuditRecord>> {
        let state = self.read()?;
        Ok(state
            .by_entity
            .get(entity)
            .map(|indices| indices.iter().map(|&i| state.records[i].clone()).collect())
            .unwrap_or_default())
    }

    fn by_batch(&self, batch_id: BatchId) -> AuditResult<Vec<AuditRecord>> {
        self.filtered(|r| r.batch_id == Some(batch_id))
    }

    fn children(&self, parent: AuditId) -> AuditResult<Vec<AuditRecord>> {
        self.filtered(|r| r.parent_audit_id == Some(parent))
    }

    fn created_before(&self, cutoff: DateTime<Utc>) -> AuditResult<Vec<AuditRecord>> {
        self.filtered(|r| r.created_at < cutoff)
    }

    fn mark_deleted(&self, id: AuditId, at: DateTime<Utc>) -> AuditResult<()> {
        let mut state = self.write()?;
        let index = *state.by_id.get(&id).ok_or(AuditError::NotFound(id))?;
        let record = &mut state.records[index];
        if record.deleted_at.is_some() {
            return Err(AuditError::AlreadyDeleted(id));
        }
        record.deleted_at = Some(at);
        Ok(())
    }

    fn count(&self) -> AuditResult<usize> {
        Ok(self.read()?.records.len())
    }
}
