use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use custodian_crypto::ContentHasher;
use custodian_diff::FieldDiff;
use custodian_types::{
    Actor, ApprovalStatus, ApprovalType, AuditId, BatchId, Checksum, EntityRef, EventType,
    FieldValue, Record, RequestId, RequestStatus, RiskLevel,
};
use serde::{Deserialize, Serialize};

use crate::error::AuditResult;

/// One mutation attempt, as written to the audit trail.
///
/// Records are immutable once stored. The only field that ever changes is
/// `deleted_at`, and only through retention.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditId,
    pub entity_ref: EntityRef,
    pub event_type: EventType,
    pub actor: Actor,
    pub old_values: BTreeMap<String, FieldValue>,
    pub new_values: BTreeMap<String, FieldValue>,
    pub changed_fields: BTreeSet<String>,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    /// `None` for the engine's own housekeeping rows, where approval does
    /// not apply.
    pub approval_status: Option<ApprovalStatus>,
    pub batch_id: Option<BatchId>,
    pub parent_audit_id: Option<AuditId>,
    pub context: Option<AuditContext>,
    pub checksum: Checksum,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// The fields covered by an audit checksum, in a fixed order.
#[derive(Serialize)]
struct ChecksumInput<'a> {
    entity_ref: &'a EntityRef,
    event_type: EventType,
    old_values: &'a BTreeMap<String, FieldValue>,
    new_values: &'a BTreeMap<String, FieldValue>,
    created_at: &'a DateTime<Utc>,
}

impl AuditRecord {
    /// Recompute the checksum from the record's current contents.
    pub fn compute_checksum(&self) -> AuditResult<Checksum> {
        checksum_for(
            &self.entity_ref,
            self.event_type,
            &self.old_values,
            &self.new_values,
            &self.created_at,
        )
    }

    /// Returns `true` if the stored checksum matches the contents.
    pub fn checksum_matches(&self) -> AuditResult<bool> {
        Ok(self.compute_checksum()? == self.checksum)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns `true` for rows the engine wrote about its own tables.
    pub fn is_internal(&self) -> bool {
        self.entity_ref.entity_type.is_internal()
    }

    /// The structural diff carried by this record.
    pub fn field_diff(&self) -> FieldDiff {
        FieldDiff {
            changed_fields: self.changed_fields.clone(),
            old_values: self.old_values.clone(),
            new_values: self.new_values.clone(),
        }
    }
}

pub(crate) fn checksum_for(
    entity_ref: &EntityRef,
    event_type: EventType,
    old_values: &BTreeMap<String, FieldValue>,
    new_values: &BTreeMap<String, FieldValue>,
    created_at: &DateTime<Utc>,
) -> AuditResult<Checksum> {
    let input = ChecksumInput {
        entity_ref,
        event_type,
        old_values,
        new_values,
        created_at,
    };
    Ok(ContentHasher::AUDIT.hash_json(&input)?)
}

/// Typed context attached to audit records of composite events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditContext {
    /// `resulting_version` is `None` while the rollback waits for approval.
    Rollback {
        target_version: u64,
        resulting_version: Option<u64>,
    },
    Merge {
        source_versions: Vec<u64>,
        resulting_version: Option<u64>,
    },
    ApprovalTransition {
        request_id: RequestId,
        from: Option<RequestStatus>,
        to: RequestStatus,
        action: String,
        step: u32,
    },
    Housekeeping {
        target_audit_id: AuditId,
        reason: String,
    },
}

/// Everything the caller knows about a mutation attempt before it is
/// recorded.
#[derive(Clone, Debug)]
pub struct AuditDraft {
    pub entity_ref: EntityRef,
    pub event_type: EventType,
    pub actor: Actor,
    pub old_state: Option<Record>,
    pub new_state: Option<Record>,
    pub batch_id: Option<BatchId>,
    pub parent_audit_id: Option<AuditId>,
    pub context: Option<AuditContext>,
    /// Set when an auto-approval rule already matched this change.
    pub auto_approved: bool,
}

impl AuditDraft {
    pub fn new(entity_ref: EntityRef, event_type: EventType, actor: Actor) -> Self {
        Self {
            entity_ref,
            event_type,
            actor,
            old_state: None,
            new_state: None,
            batch_id: None,
            parent_audit_id: None,
            context: None,
            auto_approved: false,
        }
    }

    pub fn with_states(mut self, old: Option<Record>, new: Option<Record>) -> Self {
        self.old_state = old;
        self.new_state = new;
        self
    }

    pub fn with_old(mut self, old: Record) -> Self {
        self.old_state = Some(old);
        self
    }

    pub fn with_new(mut self, new: Record) -> Self {
        self.new_state = Some(new);
        self
    }

    pub fn in_batch(mut self, batch_id: Option<BatchId>) -> Self {
        self.batch_id = batch_id;
        self
    }

    pub fn with_parent(mut self, parent: Option<AuditId>) -> Self {
        self.parent_audit_id = parent;
        self
    }

    pub fn with_context(mut self, context: AuditContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn auto_approved(mut self) -> Self {
        self.auto_approved = true;
        self
    }
}

/// Classification of a change without persisting anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assessment {
    pub diff: FieldDiff,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    pub approval_type: ApprovalType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use custodian_types::{EntityKind, UserId};

    fn sample() -> AuditRecord {
        let created_at = Utc.with_ymd_and_hms(2024, 9, 2, 8, 30, 0).unwrap();
        let entity_ref = EntityRef::new(EntityKind::ExamResult, 42);
        let mut old_values = BTreeMap::new();
        old_values.insert("grade".to_string(), FieldValue::from("B"));
        let mut new_values = BTreeMap::new();
        new_values.insert("grade".to_string(), FieldValue::from("A"));
        let checksum = checksum_for(
            &entity_ref,
            EventType::Updated,
            &old_values,
            &new_values,
            &created_at,
        )
        .unwrap();
        AuditRecord {
            id: AuditId::new(),
            entity_ref,
            event_type: EventType::Updated,
            actor: Actor::new(UserId(7), "teacher"),
            old_values,
            new_values,
            changed_fields: ["grade".to_string()].into_iter().collect(),
            risk_level: RiskLevel::High,
            requires_approval: true,
            approval_status: Some(ApprovalStatus::Pending),
            batch_id: None,
            parent_audit_id: None,
            context: None,
            checksum,
            created_at,
            deleted_at: None,
        }
    }

    #[test]
    fn checksum_is_reproducible() {
        let record = sample();
        assert!(record.checksum_matches().unwrap());
        assert_eq!(record.compute_checksum().unwrap(), record.checksum);
    }

    #[test]
    fn tampered_values_break_checksum() {
        let mut record = sample();
        record
            .new_values
            .insert("grade".to_string(), FieldValue::from("A+"));
        assert!(!record.checksum_matches().unwrap());
    }

    #[test]
    fn tampered_timestamp_breaks_checksum() {
        let mut record = sample();
        record.created_at += chrono::Duration::seconds(1);
        assert!(!record.checksum_matches().unwrap());
    }

    #[test]
    fn context_serializes_with_kind_tag() {
        let ctx = AuditContext::Rollback {
            target_version: 2,
            resulting_version: Some(6),
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["kind"], "rollback");
        assert_eq!(json["target_version"], 2);
    }

    #[test]
    fn record_serde_roundtrip() {
        let record = sample();
        let json = serde_json::to_string(&record).unwrap();
        let parsed: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.checksum_matches().unwrap());
    }
}
