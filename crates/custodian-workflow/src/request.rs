use chrono::{DateTime, Utc};
use custodian_crypto::ContentHasher;
use custodian_types::{
    ApprovalType, AuditId, Checksum, EntityKind, EntityRef, FieldValue, Priority, Record,
    RequestId, RequestStatus, UserId,
};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowResult;
use crate::step::WorkflowStep;

/// A gating workflow instance blocking one audited change until resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,
    /// The audit record of the change being gated.
    pub audit_id: AuditId,
    pub entity_ref: EntityRef,
    pub approval_type: ApprovalType,
    pub status: RequestStatus,
    pub requested_by: UserId,
    pub assigned_to: Option<UserId>,
    pub approved_by: Option<UserId>,
    pub priority: Priority,
    pub deadline: DateTime<Utc>,
    pub workflow_name: String,
    pub workflow_steps: Vec<WorkflowStep>,
    /// 1-based index into `workflow_steps`.
    pub current_step: u32,
    pub deadline_hours: u32,
    pub escalation_hours: u32,
    pub delegation_history: Vec<DelegationEntry>,
    pub escalation_level: u32,
    pub auto_approval_eligible: bool,
    pub auto_approved: bool,
    /// Hex Ed25519 signature from the final signed step, if any.
    pub digital_signature: Option<String>,
    pub comments: Vec<ApprovalComment>,
    pub transitions: Vec<Transition>,
    pub rejection_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every successful operation. Callers pass the revision they
    /// read to detect concurrent modification.
    pub revision: u64,
}

impl ApprovalRequest {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now > self.deadline
    }

    pub fn step(&self) -> Option<&WorkflowStep> {
        let index = usize::try_from(self.current_step).ok()?.checked_sub(1)?;
        self.workflow_steps.get(index)
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step as usize >= self.workflow_steps.len()
    }

    /// Escalations already taken on the current step. `escalation_level`
    /// counts across the whole request; the directory chain is per step.
    pub fn step_escalations(&self) -> u32 {
        let count = self
            .transitions
            .iter()
            .filter(|t| t.action == TransitionAction::Escalate && t.step == self.current_step)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// The reference under which this request's own transitions are
    /// audited.
    pub fn audit_entity(&self) -> EntityRef {
        EntityRef::new(EntityKind::ApprovalRequest, self.id.as_entity_id())
    }

    /// Digest an approver signs to approve the current step.
    ///
    /// Binds the request, the gated audit record, the step, the approver,
    /// and the revision, so a signature cannot be replayed on another step.
    pub fn signing_payload(&self, approver: UserId) -> WorkflowResult<Checksum> {
        #[derive(Serialize)]
        struct SigningInput<'a> {
            request_id: RequestId,
            audit_id: AuditId,
            entity_ref: &'a EntityRef,
            step: u32,
            approver: UserId,
            revision: u64,
        }

        Ok(ContentHasher::APPROVAL.hash_json(&SigningInput {
            request_id: self.id,
            audit_id: self.audit_id,
            entity_ref: &self.entity_ref,
            step: self.current_step,
            approver,
            revision: self.revision,
        })?)
    }

    /// Flat view of the mutable workflow state, used as the before/after
    /// pair in transition audit records.
    pub(crate) fn summary(&self) -> Record {
        let assigned = self
            .assigned_to
            .map_or(FieldValue::Null, |u| FieldValue::Integer(u.0));
        Record::new()
            .with("status", self.status.as_str())
            .with("current_step", i64::from(self.current_step))
            .with("assigned_to", assigned)
            .with("escalation_level", i64::from(self.escalation_level))
            .with("priority", self.priority.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationEntry {
    pub from: UserId,
    pub to: UserId,
    pub reason: String,
    pub step: u32,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalComment {
    pub author: UserId,
    pub step: u32,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// What caused a state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Submit,
    AutoApprove,
    Advance,
    Approve,
    Reject,
    Delegate,
    Reassign,
    Escalate,
    Expire,
    Cancel,
}

impl TransitionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::AutoApprove => "auto_approve",
            Self::Advance => "advance",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Delegate => "delegate",
            Self::Reassign => "reassign",
            Self::Escalate => "escalate",
            Self::Expire => "expire",
            Self::Cancel => "cancel",
        }
    }
}

/// One entry of a request's state-transition log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// `None` for the transition that created the request.
    pub from: Option<RequestStatus>,
    pub to: RequestStatus,
    pub action: TransitionAction,
    pub actor: UserId,
    pub step: u32,
    pub at: DateTime<Utc>,
    /// The audit record written for this transition.
    pub audit_id: AuditId,
}
