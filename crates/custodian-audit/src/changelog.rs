use std::sync::RwLock;

use chrono::{DateTime, Utc};
use custodian_diff::{FieldDiff, LineDiff};
use custodian_types::{Actor, AuditId, ChangeLogId, EntityRef};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

/// Lightweight change note for entities that do not need versioning or
/// approval, such as free-text remarks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: ChangeLogId,
    pub entity_ref: EntityRef,
    pub audit_id: Option<AuditId>,
    pub actor: Actor,
    pub summary: String,
    pub field_changes: FieldDiff,
    pub text_diff: Option<LineDiff>,
    pub created_at: DateTime<Utc>,
}

impl ChangeLogEntry {
    pub fn new(
        entity_ref: EntityRef,
        actor: Actor,
        summary: impl Into<String>,
        field_changes: FieldDiff,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ChangeLogId::new(),
            entity_ref,
            audit_id: None,
            actor,
            summary: summary.into(),
            field_changes,
            text_diff: None,
            created_at,
        }
    }

    pub fn with_audit(mut self, audit_id: Option<AuditId>) -> Self {
        self.audit_id = audit_id;
        self
    }

    /// Attach a line diff of a free-text body.
    pub fn with_text(mut self, old: &str, new: &str) -> Self {
        self.text_diff = Some(custodian_diff::diff_text(old, new));
        self
    }
}

/// Storage boundary for change-log entries.
pub trait ChangeLogStore: Send + Sync {
    fn append(&self, entry: ChangeLogEntry) -> AuditResult<()>;

    fn for_entity(&self, entity: &EntityRef) -> AuditResult<Vec<ChangeLogEntry>>;

    fn for_audit(&self, audit_id: AuditId) -> AuditResult<Vec<ChangeLogEntry>>;
}

#[derive(Default)]
pub struct InMemoryChangeLog {
    entries: RwLock<Vec<ChangeLogEntry>>,
}

impl InMemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&self, pred: impl Fn(&ChangeLogEntry) -> bool) -> AuditResult<Vec<ChangeLogEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AuditError::StoreError("change log read lock poisoned".into()))?;
        Ok(entries.iter().filter(|e| pred(e)).cloned().collect())
    }
}

impl ChangeLogStore for InMemoryChangeLog {
    fn append(&self, entry: ChangeLogEntry) -> AuditResult<()> {
        self.entries
            .write()
            .map_err(|_| AuditError::StoreError("change log write lock poisoned".into()))?
            .push(entry);
        Ok(())
    }

    fn for_entity(&self, entity: &EntityRef) -> AuditResult<Vec<ChangeLogEntry>> {
        self.select(|e| e.entity_ref == *entity)
    }

    fn for_audit(&self, audit_id: AuditId) -> AuditResult<Vec<ChangeLogEntry>> {
        self.select(|e| e.audit_id == Some(audit_id))
    }
}
