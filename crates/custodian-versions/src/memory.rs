use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use custodian_audit::{AuditContext, AuditDraft, AuditRecorder};
use custodian_crypto::HashChainVerifier;
use custodian_types::{Actor, AuditId, Checksum, EntityRef, EventType, Record, VersionId};
use tracing::{debug, error, info, warn};

use crate::error::{VersionError, VersionResult};
use crate::traits::{VersionReader, VersionWriter};
use crate::validation::{structural_violation, validate_history, ValidationReport};
use crate::version::{chain_payload, snapshot_checksum, DataVersion, RecordedVersion};

/// In-memory version store for tests, local demos, and embedding.
///
/// One write lock serializes every commit, so the flip of
/// `is_current_version` and the append of the new row happen as a single
/// step from any reader's point of view.
pub struct InMemoryVersionStore {
    recorder: Arc<AuditRecorder>,
    inner: RwLock<VersionState>,
}

#[derive(Default)]
struct VersionState {
    chains: HashMap<EntityRef, Vec<DataVersion>>,
    quarantined: HashSet<EntityRef>,
}

/// What the next version will contain.
struct NextVersion {
    snapshot: Record,
    tombstone: bool,
    merge_source_versions: Vec<u64>,
    rolled_back_from: Option<u64>,
}

impl NextVersion {
    fn snapshot(snapshot: Record) -> Self {
        Self {
            snapshot,
            tombstone: false,
            merge_source_versions: Vec::new(),
            rolled_back_from: None,
        }
    }

    fn copy_of(target: &DataVersion) -> Self {
        Self {
            snapshot: target.data_snapshot.clone(),
            tombstone: target.tombstone,
            merge_source_versions: Vec::new(),
            rolled_back_from: Some(target.version_number),
        }
    }
}

impl InMemoryVersionStore {
    pub fn new(recorder: Arc<AuditRecorder>) -> Self {
        Self {
            recorder,
            inner: RwLock::new(VersionState::default()),
        }
    }

    pub fn recorder(&self) -> &Arc<AuditRecorder> {
        &self.recorder
    }

    /// Replace an entity's history with rows loaded from persistent
    /// storage. Nothing is validated here; the next write to the entity
    /// checks the loaded history first.
    pub fn load_history(&self, entity: &EntityRef, versions: Vec<DataVersion>) -> VersionResult<()> {
        let mut state = self.write()?;
        debug!(entity = %entity, count = versions.len(), "version history loaded");
        state.chains.insert(entity.clone(), versions);
        Ok(())
    }

    /// The live snapshot, or `None` if the entity has no versions or was
    /// deleted.
    pub fn current_snapshot(&self, entity: &EntityRef) -> VersionResult<Option<Record>> {
        Ok(self
            .current(entity)?
            .and_then(|v| v.snapshot().cloned()))
    }

    fn read(&self) -> VersionResult<RwLockReadGuard<'_, VersionState>> {
        self.inner
            .read()
            .map_err(|_| VersionError::StoreError("version read lock poisoned".into()))
    }

    fn write(&self) -> VersionResult<RwLockWriteGuard<'_, VersionState>> {
        self.inner
            .write()
            .map_err(|_| VersionError::StoreError("version write lock poisoned".into()))
    }

    fn now(&self) -> DateTime<Utc> {
        self.recorder.clock().now()
    }

    /// Refuse writes to quarantined entities and quarantine any entity whose
    /// history breaks the single-current, gap-free invariant.
    fn guard_entity(state: &mut VersionState, entity: &EntityRef) -> VersionResult<()> {
        if state.quarantined.contains(entity) {
            warn!(entity = %entity, "write refused: entity quarantined");
            return Err(VersionError::EntityQuarantined(entity.clone()));
        }

        let chain = state.chains.get(entity).map(Vec::as_slice).unwrap_or_default();
        if let Some((kind, reason)) = structural_violation(chain) {
            state.quarantined.insert(entity.clone());
            error!(
                entity = %entity,
                ?kind,
                reason = %reason,
                "version invariant violated; entity quarantined"
            );
            return Err(VersionError::InvariantViolation {
                entity: entity.clone(),
                reason,
            });
        }
        Ok(())
    }

    fn chain<'a>(state: &'a VersionState, entity: &EntityRef) -> &'a [DataVersion] {
        state.chains.get(entity).map(Vec::as_slice).unwrap_or_default()
    }

    fn find(state: &VersionState, entity: &EntityRef, number: u64) -> VersionResult<DataVersion> {
        Self::chain(state, entity)
            .iter()
            .find(|v| v.version_number == number)
            .cloned()
            .ok_or_else(|| VersionError::VersionNotFound {
                entity: entity.clone(),
                version: number,
            })
    }

    fn check_merge_sources(
        state: &VersionState,
        entity: &EntityRef,
        sources: &[u64],
    ) -> VersionResult<()> {
        if sources.is_empty() {
            return Err(VersionError::InvalidMerge {
                entity: entity.clone(),
                reason: "no source versions".into(),
            });
        }
        for &number in sources {
            Self::find(state, entity, number)?;
        }
        Ok(())
    }

    /// Append the next version and flip the current marker. Infallible:
    /// everything that can fail is computed before this point.
    fn push_version(
        state: &mut VersionState,
        entity: &EntityRef,
        audit_id: AuditId,
        next: NextVersion,
        checksum: Checksum,
        now: DateTime<Utc>,
    ) -> DataVersion {
        let chain = state.chains.entry(entity.clone()).or_default();
        let version_number = chain.len() as u64 + 1;
        let prev_chain_hash = chain.last().map(|v| v.chain_hash);
        let chain_hash = HashChainVerifier::compute_hash(
            &chain_payload(version_number, &checksum, next.tombstone),
            prev_chain_hash,
        );

        let parent_version_id = chain.iter().find(|v| v.is_current_version).map(|v| v.id);
        let version = DataVersion {
            id: VersionId::new(),
            audit_id,
            entity_ref: entity.clone(),
            version_number,
            data_snapshot: next.snapshot,
            parent_version_id,
            merge_source_versions: next.merge_source_versions,
            is_current_version: true,
            checksum,
            chain_hash,
            prev_chain_hash,
            tombstone: next.tombstone,
            rolled_back_from: next.rolled_back_from,
            created_at: now,
        };

        for previous in chain.iter_mut().filter(|v| v.is_current_version) {
            previous.is_current_version = false;
        }
        chain.push(version.clone());

        debug!(
            entity = %entity,
            version = version_number,
            audit_id = %audit_id,
            tombstone = version.tombstone,
            "version committed"
        );
        version
    }

    fn commit_next(
        &self,
        entity: &EntityRef,
        audit_id: AuditId,
        next: NextVersion,
    ) -> VersionResult<DataVersion> {
        let checksum = snapshot_checksum(&next.snapshot)?;
        let now = self.now();
        let mut state = self.write()?;
        Self::guard_entity(&mut state, entity)?;
        Ok(Self::push_version(&mut state, entity, audit_id, next, checksum, now))
    }
}

impl VersionWriter for InMemoryVersionStore {
    fn commit(
        &self,
        entity: &EntityRef,
        audit_id: AuditId,
        snapshot: Record,
    ) -> VersionResult<DataVersion> {
        self.commit_next(entity, audit_id, NextVersion::snapshot(snapshot))
    }

    fn commit_tombstone(&self, entity: &EntityRef, audit_id: AuditId) -> VersionResult<DataVersion> {
        let next = NextVersion {
            tombstone: true,
            ..NextVersion::snapshot(Record::new())
        };
        self.commit_next(entity, audit_id, next)
    }

    fn rollback(
        &self,
        entity: &EntityRef,
        target: u64,
        actor: Actor,
    ) -> VersionResult<RecordedVersion> {
        let mut state = self.write()?;
        Self::guard_entity(&mut state, entity)?;

        let target_version = Self::find(&state, entity, target)?;
        let current = Self::chain(&state, entity)
            .iter()
            .find(|v| v.is_current_version)
            .and_then(|v| v.snapshot().cloned());
        let resulting = Self::chain(&state, entity).len() as u64 + 1;
        let checksum = target_version.checksum;

        let audit = self.recorder.record(
            AuditDraft::new(entity.clone(), EventType::Rollback, actor)
                .with_states(current, target_version.snapshot().cloned())
                .with_context(AuditContext::Rollback {
                    target_version: target,
                    resulting_version: Some(resulting),
                }),
        )?;

        let version = Self::push_version(
            &mut state,
            entity,
            audit.id,
            NextVersion::copy_of(&target_version),
            checksum,
            self.now(),
        );
        info!(
            entity = %entity,
            target,
            version = version.version_number,
            actor = %audit.actor.user_id,
            "rolled back"
        );
        Ok(RecordedVersion { version, audit })
    }

    fn merge(
        &self,
        entity: &EntityRef,
        sources: &[u64],
        merged: Record,
        actor: Actor,
    ) -> VersionResult<RecordedVersion> {
        let checksum = snapshot_checksum(&merged)?;
        let mut state = self.write()?;
        Self::guard_entity(&mut state, entity)?;
        Self::check_merge_sources(&state, entity, sources)?;

        let current = Self::chain(&state, entity)
            .iter()
            .find(|v| v.is_current_version)
            .and_then(|v| v.snapshot().cloned());
        let resulting = Self::chain(&state, entity).len() as u64 + 1;

        let audit = self.recorder.record(
            AuditDraft::new(entity.clone(), EventType::Merge, actor)
                .with_states(current, Some(merged.clone()))
                .with_context(AuditContext::Merge {
                    source_versions: sources.to_vec(),
                    resulting_version: Some(resulting),
                }),
        )?;

        let next = NextVersion {
            merge_source_versions: sources.to_vec(),
            ..NextVersion::snapshot(merged)
        };
        let version = Self::push_version(&mut state, entity, audit.id, next, checksum, self.now());
        info!(
            entity = %entity,
            sources = ?sources,
            version = version.version_number,
            "merged"
        );
        Ok(RecordedVersion { version, audit })
    }

    fn apply_rollback(
        &self,
        entity: &EntityRef,
        target: u64,
        audit_id: AuditId,
    ) -> VersionResult<DataVersion> {
        let mut state = self.write()?;
        Self::guard_entity(&mut state, entity)?;
        let target_version = Self::find(&state, entity, target)?;
        let version = Self::push_version(
            &mut state,
            entity,
            audit_id,
            NextVersion::copy_of(&target_version),
            target_version.checksum,
            self.now(),
        );
        info!(entity = %entity, target, version = version.version_number, "approved rollback applied");
        Ok(version)
    }

    fn apply_merge(
        &self,
        entity: &EntityRef,
        sources: &[u64],
        merged: Record,
        audit_id: AuditId,
    ) -> VersionResult<DataVersion> {
        let checksum = snapshot_checksum(&merged)?;
        let mut state = self.write()?;
        Self::guard_entity(&mut state, entity)?;
        Self::check_merge_sources(&state, entity, sources)?;
        let next = NextVersion {
            merge_source_versions: sources.to_vec(),
            ..NextVersion::snapshot(merged)
        };
        let version = Self::push_version(&mut state, entity, audit_id, next, checksum, self.now());
        info!(entity = %entity, sources = ?sources, version = version.version_number, "approved merge applied");
        Ok(version)
    }

    fn release_quarantine(&self, entity: &EntityRef) -> VersionResult<bool> {
        let released = self.write()?.quarantined.remove(entity);
        if released {
            info!(entity = %entity, "quarantine released");
        }
        Ok(released)
    }
}

impl VersionReader for InMemoryVersionStore {
    fn current(&self, entity: &EntityRef) -> VersionResult<Option<DataVersion>> {
        let state = self.read()?;
        Ok(Self::chain(&state, entity)
            .iter()
            .find(|v| v.is_current_version)
            .cloned())
    }

    fn get(&self, entity: &EntityRef, version_number: u64) -> VersionResult<DataVersion> {
        Self::find(&*self.read()?, entity, version_number)
    }

    fn history(&self, entity: &EntityRef) -> VersionResult<Vec<DataVersion>> {
        Ok(Self::chain(&*self.read()?, entity).to_vec())
    }

    fn validate_chain(&self, entity: &EntityRef) -> VersionResult<ValidationReport> {
        let history = self.history(entity)?;
        validate_history(entity, &history)
    }

    fn is_quarantined(&self, entity: &EntityRef) -> VersionResult<bool> {
        Ok(self.read()?.quarantined.contains(entity))
    }

    fn entities(&self) -> VersionResult<Vec<EntityRef>> {
        let mut entities: Vec<EntityRef> = self.read()?.chains.keys().cloned().collect();
        entities.sort();
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ViolationKind;
    use custodian_audit::AuditStore;
    use custodian_types::{EntityKind, FieldValue, UserId};
    use proptest::prelude::*;

    fn store() -> InMemoryVersionStore {
        InMemoryVersionStore::new(Arc::new(AuditRecorder::in_memory()))
    }

    fn roster() -> EntityRef {
        EntityRef::new(EntityKind::ClassRoster, 7)
    }

    fn snap(n: i64) -> Record {
        Record::new().with("size", n).with("room", format!("R{n}"))
    }

    fn principal() -> Actor {
        Actor::new(UserId(1), "principal")
    }

    fn commit_n(store: &InMemoryVersionStore, entity: &EntityRef, n: i64) {
        for i in 1..=n {
            store.commit(entity, AuditId::new(), snap(i)).unwrap();
        }
    }

    fn assert_single_current(store: &InMemoryVersionStore, entity: &EntityRef) {
        let history = store.history(entity).unwrap();
        assert_eq!(history.iter().filter(|v| v.is_current_version).count(), 1);
        for (i, v) in history.iter().enumerate() {
            assert_eq!(v.version_number, i as u64 + 1);
        }
    }

    // ---- 1. Commit ----

    #[test]
    fn first_commit_is_version_one() {
        let store = store();
        let v = store.commit(&roster(), AuditId::new(), snap(1)).unwrap();
        assert_eq!(v.version_number, 1);
        assert!(v.parent_version_id.is_none());
        assert!(v.prev_chain_hash.is_none());
        assert!(v.is_current_version);
    }

    #[test]
    fn commit_flips_current_and_links_parent() {
        let store = store();
        let v1 = store.commit(&roster(), AuditId::new(), snap(1)).unwrap();
        let v2 = store.commit(&roster(), AuditId::new(), snap(2)).unwrap();

        assert_eq!(v2.version_number, 2);
        assert_eq!(v2.parent_version_id, Some(v1.id));
        assert_eq!(v2.prev_chain_hash, Some(v1.chain_hash));
        assert!(!store.get(&roster(), 1).unwrap().is_current_version);
        assert_eq!(store.current(&roster()).unwrap().unwrap().id, v2.id);
        assert_single_current(&store, &roster());
    }

    #[test]
    fn entities_are_independent() {
        let store = store();
        let other = EntityRef::new(EntityKind::ClassRoster, 8);
        commit_n(&store, &roster(), 3);
        let v = store.commit(&other, AuditId::new(), snap(1)).unwrap();
        assert_eq!(v.version_number, 1);
        assert_eq!(store.entities().unwrap().len(), 2);
    }

    #[test]
    fn tombstone_hides_snapshot() {
        let store = store();
        commit_n(&store, &roster(), 1);
        let t = store.commit_tombstone(&roster(), AuditId::new()).unwrap();
        assert!(t.tombstone);
        assert_eq!(t.version_number, 2);
        assert_eq!(store.current_snapshot(&roster()).unwrap(), None);
    }

    // ---- 2. Rollback ----

    #[test]
    fn rollback_appends_copy_of_target() {
        let store = store();
        commit_n(&store, &roster(), 5);

        let RecordedVersion { version, audit } =
            store.rollback(&roster(), 2, principal()).unwrap();

        assert_eq!(version.version_number, 6);
        assert_eq!(version.data_snapshot, store.get(&roster(), 2).unwrap().data_snapshot);
        assert_eq!(version.rolled_back_from, Some(2));
        assert_eq!(version.audit_id, audit.id);
        assert_eq!(
            store.current(&roster()).unwrap().unwrap().data_snapshot,
            snap(2)
        );
        assert_eq!(store.history(&roster()).unwrap().len(), 6);

        assert_eq!(audit.event_type, EventType::Rollback);
        assert_eq!(
            audit.context,
            Some(AuditContext::Rollback {
                target_version: 2,
                resulting_version: Some(6),
            })
        );
        assert!(audit.changed_fields.contains("size"));
        assert_single_current(&store, &roster());
    }

    #[test]
    fn rollback_across_a_field_kind_change() {
        let store = store();
        let entity = roster();
        store
            .commit(&entity, AuditId::new(), Record::new().with("score", 81i64))
            .unwrap();
        store
            .commit(&entity, AuditId::new(), Record::new().with("score", FieldValue::Null))
            .unwrap();
        store
            .commit(&entity, AuditId::new(), Record::new().with("score", "A"))
            .unwrap();

        let RecordedVersion { version, audit } = store.rollback(&entity, 1, principal()).unwrap();

        assert_eq!(version.version_number, 4);
        assert_eq!(version.data_snapshot, Record::new().with("score", 81i64));
        assert!(audit.changed_fields.contains("score"));
        assert_single_current(&store, &entity);
    }

    #[test]
    fn rollback_to_missing_version_fails_without_audit() {
        let store = store();
        commit_n(&store, &roster(), 2);
        let err = store.rollback(&roster(), 9, principal()).unwrap_err();
        assert_eq!(
            err,
            VersionError::VersionNotFound {
                entity: roster(),
                version: 9,
            }
        );
        assert_eq!(store.recorder().store().count().unwrap(), 0);
        assert_eq!(store.history(&roster()).unwrap().len(), 2);
    }

    #[test]
    fn rollback_of_unknown_entity_is_not_found() {
        let store = store();
        assert!(matches!(
            store.rollback(&roster(), 1, principal()),
            Err(VersionError::VersionNotFound { .. })
        ));
    }

    #[test]
    fn apply_rollback_uses_given_audit() {
        let store = store();
        commit_n(&store, &roster(), 3);
        let audit_id = AuditId::new();
        let v = store.apply_rollback(&roster(), 1, audit_id).unwrap();
        assert_eq!(v.audit_id, audit_id);
        assert_eq!(v.data_snapshot, snap(1));
    }

    // ---- 3. Merge ----

    #[test]
    fn merge_records_sources() {
        let store = store();
        commit_n(&store, &roster(), 3);
        let merged = snap(2).with("room", "R3");
        let RecordedVersion { version, audit } = store
            .merge(&roster(), &[2, 3], merged.clone(), principal())
            .unwrap();

        assert_eq!(version.version_number, 4);
        assert_eq!(version.merge_source_versions, vec![2, 3]);
        assert!(version.is_merge());
        assert_eq!(version.data_snapshot, merged);
        assert_eq!(audit.event_type, EventType::Merge);
    }

    #[test]
    fn merge_requires_existing_sources() {
        let store = store();
        commit_n(&store, &roster(), 2);
        assert!(matches!(
            store.merge(&roster(), &[1, 4], snap(9), principal()),
            Err(VersionError::VersionNotFound { version: 4, .. })
        ));
        assert!(matches!(
            store.merge(&roster(), &[], snap(9), principal()),
            Err(VersionError::InvalidMerge { .. })
        ));
        assert_eq!(store.history(&roster()).unwrap().len(), 2);
    }

    // ---- 4. Invariants and quarantine ----

    #[test]
    fn two_current_versions_quarantine_the_entity() {
        let store = store();
        commit_n(&store, &roster(), 2);
        let mut broken = store.history(&roster()).unwrap();
        broken[0].is_current_version = true;
        store.load_history(&roster(), broken).unwrap();

        let err = store.commit(&roster(), AuditId::new(), snap(3)).unwrap_err();
        assert!(matches!(err, VersionError::InvariantViolation { .. }));
        assert!(store.is_quarantined(&roster()).unwrap());

        let err = store.commit(&roster(), AuditId::new(), snap(3)).unwrap_err();
        assert_eq!(err, VersionError::EntityQuarantined(roster()));
        assert!(matches!(
            store.rollback(&roster(), 1, principal()),
            Err(VersionError::EntityQuarantined(_))
        ));
    }

    #[test]
    fn release_after_reconciliation() {
        let store = store();
        commit_n(&store, &roster(), 2);
        let good = store.history(&roster()).unwrap();
        let mut broken = good.clone();
        broken[1].version_number = 3;
        store.load_history(&roster(), broken).unwrap();
        assert!(store.commit(&roster(), AuditId::new(), snap(3)).is_err());

        store.load_history(&roster(), good).unwrap();
        assert!(store.release_quarantine(&roster()).unwrap());
        assert!(!store.release_quarantine(&roster()).unwrap());
        let v = store.commit(&roster(), AuditId::new(), snap(3)).unwrap();
        assert_eq!(v.version_number, 3);
    }

    #[test]
    fn validate_chain_detects_tampered_snapshot() {
        let store = store();
        commit_n(&store, &roster(), 3);
        assert!(store.validate_chain(&roster()).unwrap().is_valid());

        let mut tampered = store.history(&roster()).unwrap();
        tampered[1].data_snapshot = snap(99);
        store.load_history(&roster(), tampered).unwrap();

        let report = store.validate_chain(&roster()).unwrap();
        assert!(!report.snapshots_intact);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::SnapshotChecksum && v.version_number == 2));
    }

    #[test]
    fn validate_chain_detects_rewritten_checksum() {
        let store = store();
        commit_n(&store, &roster(), 3);
        let mut tampered = store.history(&roster()).unwrap();
        tampered[1].data_snapshot = snap(99);
        tampered[1].checksum = snapshot_checksum(&tampered[1].data_snapshot).unwrap();
        store.load_history(&roster(), tampered).unwrap();

        let report = store.validate_chain(&roster()).unwrap();
        assert!(report.snapshots_intact);
        assert!(!report.hash_chain_valid);
    }

    // ---- 5. Properties ----

    #[derive(Clone, Debug)]
    enum Op {
        Commit(i64),
        Tombstone,
        Rollback(u64),
        Merge(u64, u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0i64..50).prop_map(Op::Commit),
            1 => Just(Op::Tombstone),
            2 => (1u64..12).prop_map(Op::Rollback),
            1 => (1u64..12, 1u64..12).prop_map(|(a, b)| Op::Merge(a, b)),
        ]
    }

    proptest! {
        #[test]
        fn history_stays_gap_free_with_one_current(ops in prop::collection::vec(op(), 1..24)) {
            let store = store();
            let entity = roster();
            for op in ops {
                let before = store.history(&entity).unwrap().len();
                let result = match op {
                    Op::Commit(n) => store.commit(&entity, AuditId::new(), snap(n)).map(|_| ()),
                    Op::Tombstone => store.commit_tombstone(&entity, AuditId::new()).map(|_| ()),
                    Op::Rollback(t) => store.rollback(&entity, t, principal()).map(|_| ()),
                    Op::Merge(a, b) => store.merge(&entity, &[a, b], snap(0), principal()).map(|_| ()),
                };
                let after = store.history(&entity).unwrap().len();
                match result {
                    Ok(()) => prop_assert_eq!(after, before + 1),
                    Err(_) => prop_assert_eq!(after, before),
                }
                if after > 0 {
                    let report = store.validate_chain(&entity).unwrap();
                    prop_assert!(report.is_valid(), "{:?}", report.violations);
                    prop_assert_eq!(report.current_count, 1);
                }
            }
        }

        #[test]
        fn rollback_restores_target_snapshot(n in 2i64..8, target_seed in any::<u64>()) {
            let store = store();
            commit_n(&store, &roster(), n);
            let target = target_seed % n as u64 + 1;
            let recorded = store.rollback(&roster(), target, principal()).unwrap();
            let current = store.current(&roster()).unwrap().unwrap();
            prop_assert_eq!(current.version_number, n as u64 + 1);
            prop_assert_eq!(
                current.data_snapshot.canonical_bytes().unwrap(),
                store.get(&roster(), target).unwrap().data_snapshot.canonical_bytes().unwrap()
            );
            prop_assert_eq!(recorded.version.id, current.id);
        }
    }
}
