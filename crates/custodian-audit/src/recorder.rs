use std::sync::Arc;

use chrono::{DateTime, Utc};
use custodian_diff::FieldDiff;
use custodian_types::{
    Actor, ApprovalStatus, ApprovalType, AuditId, Clock, EntityKind, EntityRef, EventType,
    FieldValue, Record, SystemClock,
};
use tracing::{debug, info, warn};

use crate::error::{AuditError, AuditResult};
use crate::policy::{ApprovalPolicy, NoApproval};
use crate::record::{checksum_for, Assessment, AuditContext, AuditDraft, AuditRecord};
use crate::risk::RiskRuleTable;
use crate::store::{AuditStore, InMemoryAuditStore};

/// Reason written on housekeeping rows produced by retention sweeps.
pub const RETENTION_REASON: &str = "retention";

/// Turns mutation attempts into immutable, checksummed audit records.
///
/// Stateless apart from the store: classification and checksumming are
/// pure, so the recorder can be shared across threads behind an `Arc`.
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    risk_rules: RiskRuleTable,
    policy: Arc<dyn ApprovalPolicy>,
    clock: Arc<dyn Clock>,
}

impl AuditRecorder {
    pub fn new(
        store: Arc<dyn AuditStore>,
        risk_rules: RiskRuleTable,
        policy: Arc<dyn ApprovalPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            risk_rules,
            policy,
            clock,
        }
    }

    /// An in-memory recorder with no risk rules that never requires
    /// approval.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryAuditStore::new()),
            RiskRuleTable::default(),
            Arc::new(NoApproval),
            Arc::new(SystemClock),
        )
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn risk_rules(&self) -> &RiskRuleTable {
        &self.risk_rules
    }

    /// Diff, classify, and run the approval policy without writing
    /// anything.
    pub fn classify(
        &self,
        entity_ref: &EntityRef,
        event_type: EventType,
        old: Option<&Record>,
        new: Option<&Record>,
    ) -> AuditResult<Assessment> {
        if old.is_none() && new.is_none() {
            return Err(AuditError::InvalidAuditEvent {
                entity: entity_ref.clone(),
            });
        }

        // A field may change kind through null over an entity's lifetime,
        // so history replays cannot reject on shape.
        let diff = if event_type.replays_history() {
            custodian_diff::diff_lenient(old, new)
        } else if event_type.implies_mutation() {
            custodian_diff::diff(old, new)?
        } else {
            FieldDiff::new()
        };
        let kind = &entity_ref.entity_type;
        let risk_level = self.risk_rules.classify(kind, event_type, &diff);
        let requires_approval =
            !kind.is_internal() && self.policy.requires_approval(kind, event_type, risk_level);

        Ok(Assessment {
            diff,
            risk_level,
            requires_approval,
            approval_type: ApprovalType::for_event(event_type, risk_level),
        })
    }

    /// Record one mutation attempt and persist it.
    pub fn record(&self, draft: AuditDraft) -> AuditResult<AuditRecord> {
        let assessment = self.classify(
            &draft.entity_ref,
            draft.event_type,
            draft.old_state.as_ref(),
            draft.new_state.as_ref(),
        )?;

        let approval_status = if draft.entity_ref.entity_type.is_internal() {
            None
        } else if !assessment.requires_approval {
            Some(ApprovalStatus::NotRequired)
        } else if draft.auto_approved {
            Some(ApprovalStatus::AutoApproved)
        } else {
            Some(ApprovalStatus::Pending)
        };

        let created_at = self.clock.now();
        let FieldDiff {
            changed_fields,
            old_values,
            new_values,
        } = assessment.diff;
        let checksum = checksum_for(
            &draft.entity_ref,
            draft.event_type,
            &old_values,
            &new_values,
            &created_at,
        )?;

        let record = AuditRecord {
            id: AuditId::new(),
            entity_ref: draft.entity_ref,
            event_type: draft.event_type,
            actor: draft.actor,
            old_values,
            new_values,
            changed_fields,
            risk_level: assessment.risk_level,
            requires_approval: assessment.requires_approval,
            approval_status,
            batch_id: draft.batch_id,
            parent_audit_id: draft.parent_audit_id,
            context: draft.context,
            checksum,
            created_at,
            deleted_at: None,
        };

        self.store.insert(record.clone())?;
        debug!(
            audit_id = %record.id,
            entity = %record.entity_ref,
            event = %record.event_type,
            risk = %record.risk_level,
            requires_approval = record.requires_approval,
            "audit record written"
        );
        Ok(record)
    }

    /// Verify a record's checksum against its contents.
    pub fn verify(&self, record: &AuditRecord) -> AuditResult<()> {
        if record.checksum_matches()? {
            Ok(())
        } else {
            warn!(audit_id = %record.id, entity = %record.entity_ref, "audit checksum mismatch");
            Err(AuditError::ChecksumMismatch { id: record.id })
        }
    }

    /// Ids of every stored record for `entity` whose checksum no longer
    /// matches.
    pub fn verify_entity(&self, entity: &EntityRef) -> AuditResult<Vec<AuditId>> {
        let mut tampered = Vec::new();
        for record in self.store.for_entity(entity)? {
            if !record.checksum_matches()? {
                tampered.push(record.id);
            }
        }
        Ok(tampered)
    }

    pub fn get(&self, id: AuditId) -> AuditResult<AuditRecord> {
        self.store.get(id)?.ok_or(AuditError::NotFound(id))
    }

    pub fn history(&self, entity: &EntityRef) -> AuditResult<Vec<AuditRecord>> {
        self.store.for_entity(entity)
    }

    /// Soft-delete one record and write the housekeeping row describing it.
    ///
    /// Housekeeping rows live under `EntityKind::AuditRecord` and cannot be
    /// soft-deleted themselves.
    pub fn soft_delete(&self, id: AuditId, actor: Actor, reason: &str) -> AuditResult<AuditRecord> {
        let target = self.get(id)?;
        if target.entity_ref.entity_type == EntityKind::AuditRecord {
            return Err(AuditError::HousekeepingImmutable(id));
        }
        if target.is_deleted() {
            return Err(AuditError::AlreadyDeleted(id));
        }

        let now = self.clock.now();
        self.store.mark_deleted(id, now)?;

        let draft = AuditDraft::new(
            EntityRef::new(EntityKind::AuditRecord, id.as_entity_id()),
            EventType::Deleted,
            actor,
        )
        .with_old(housekeeping_summary(&target))
        .with_parent(Some(id))
        .with_context(AuditContext::Housekeeping {
            target_audit_id: id,
            reason: reason.to_string(),
        });
        let housekeeping = self.record(draft)?;

        info!(audit_id = %id, entity = %target.entity_ref, reason, "audit record soft-deleted");
        Ok(housekeeping)
    }

    /// Soft-delete every live record created before `cutoff`.
    ///
    /// Returns the housekeeping rows written.
    pub fn apply_retention(
        &self,
        cutoff: DateTime<Utc>,
        actor: Actor,
    ) -> AuditResult<Vec<AuditRecord>> {
        let expired: Vec<AuditRecord> = self
            .store
            .created_before(cutoff)?
            .into_iter()
            .filter(|r| !r.is_deleted() && r.entity_ref.entity_type != EntityKind::AuditRecord)
            .collect();

        let mut written = Vec::with_capacity(expired.len());
        for record in expired {
            match self.soft_delete(record.id, actor.clone(), RETENTION_REASON) {
                Ok(row) => written.push(row),
                // Raced with a concurrent sweep.
                Err(AuditError::AlreadyDeleted(_)) => {}
                Err(err) => return Err(err),
            }
        }

        info!(%cutoff, count = written.len(), "retention applied");
        Ok(written)
    }
}

fn housekeeping_summary(target: &AuditRecord) -> Record {
    Record::new()
        .with("audit_id", target.id.to_string())
        .with("entity", target.entity_ref.to_string())
        .with("event_type", target.event_type.as_str())
        .with("checksum", target.checksum.to_hex())
        .with("created_at", FieldValue::Text(target.created_at.to_rfc3339()))
}
