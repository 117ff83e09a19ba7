use custodian_types::{Actor, AuditId, EntityRef, Record};

use crate::error::VersionResult;
use crate::validation::ValidationReport;
use crate::version::{DataVersion, RecordedVersion};

/// Write boundary for version chains.
///
/// `commit`, `commit_tombstone`, `apply_rollback` and `apply_merge` take an
/// already-written audit id. `rollback` and `merge` write their own audit
/// record and are meant for changes that need no approval.
pub trait VersionWriter: Send + Sync {
    fn commit(&self, entity: &EntityRef, audit_id: AuditId, snapshot: Record)
        -> VersionResult<DataVersion>;

    fn commit_tombstone(&self, entity: &EntityRef, audit_id: AuditId) -> VersionResult<DataVersion>;

    fn rollback(&self, entity: &EntityRef, target: u64, actor: Actor)
        -> VersionResult<RecordedVersion>;

    fn merge(
        &self,
        entity: &EntityRef,
        sources: &[u64],
        merged: Record,
        actor: Actor,
    ) -> VersionResult<RecordedVersion>;

    fn apply_rollback(&self, entity: &EntityRef, target: u64, audit_id: AuditId)
        -> VersionResult<DataVersion>;

    fn apply_merge(
        &self,
        entity: &EntityRef,
        sources: &[u64],
        merged: Record,
        audit_id: AuditId,
    ) -> VersionResult<DataVersion>;

    /// Lift a quarantine after manual reconciliation. Returns `true` if the
    /// entity was quarantined.
    fn release_quarantine(&self, entity: &EntityRef) -> VersionResult<bool>;
}

/// Read boundary for version chains.
pub trait VersionReader: Send + Sync {
    fn current(&self, entity: &EntityRef) -> VersionResult<Option<DataVersion>>;

    /// Fails with `VersionNotFound` if the entity has no such version.
    fn get(&self, entity: &EntityRef, version_number: u64) -> VersionResult<DataVersion>;

    fn history(&self, entity: &EntityRef) -> VersionResult<Vec<DataVersion>>;

    fn validate_chain(&self, entity: &EntityRef) -> VersionResult<ValidationReport>;

    fn is_quarantined(&self, entity: &EntityRef) -> VersionResult<bool>;

    fn entities(&self) -> VersionResult<Vec<EntityRef>>;
}
