use custodian_crypto::Signature;
use custodian_types::{Actor, AuditId, BatchId, EntityRef, EventType, Record, RequestId, UserId};
use custodian_versions::DataVersion;
use custodian_workflow::{ApprovalRequest, WorkflowConfig};
use serde::{Deserialize, Serialize};

/// A proposed mutation of a protected record.
///
/// The caller supplies both full states; the engine never reads the domain
/// store itself.
#[derive(Clone, Debug)]
pub struct ChangeProposal {
    pub entity_ref: EntityRef,
    pub event_type: EventType,
    pub actor: Actor,
    pub old_state: Option<Record>,
    pub new_state: Option<Record>,
    /// Overrides the configured workflow for this change.
    pub workflow: Option<WorkflowConfig>,
    pub parent_audit_id: Option<AuditId>,
}

impl ChangeProposal {
    pub fn new(entity_ref: EntityRef, event_type: EventType, actor: Actor) -> Self {
        Self {
            entity_ref,
            event_type,
            actor,
            old_state: None,
            new_state: None,
            workflow: None,
            parent_audit_id: None,
        }
    }

    /// A `created` proposal.
    pub fn create(entity_ref: EntityRef, actor: Actor, state: Record) -> Self {
        Self::new(entity_ref, EventType::Created, actor).with_new(state)
    }

    /// An `updated` proposal.
    pub fn update(entity_ref: EntityRef, actor: Actor, old: Record, new: Record) -> Self {
        Self::new(entity_ref, EventType::Updated, actor)
            .with_old(old)
            .with_new(new)
    }

    /// A `deleted` proposal. Commits as a tombstone version.
    pub fn delete(entity_ref: EntityRef, actor: Actor, old: Record) -> Self {
        Self::new(entity_ref, EventType::Deleted, actor).with_old(old)
    }

    pub fn with_old(mut self, old: Record) -> Self {
        self.old_state = Some(old);
        self
    }

    pub fn with_new(mut self, new: Record) -> Self {
        self.new_state = Some(new);
        self
    }

    pub fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn with_parent(mut self, parent: AuditId) -> Self {
        self.parent_audit_id = Some(parent);
        self
    }
}

/// Where a proposal ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Applied. `version` is the resulting version number, `None` for events
    /// that do not change stored state.
    Committed { version: Option<u64> },
    /// Staged behind an approval request.
    PendingApproval,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalOutcome {
    pub status: ProposalStatus,
    pub audit_id: AuditId,
    /// Set when the change went through the workflow, including
    /// auto-approval.
    pub request_id: Option<RequestId>,
}

impl ProposalOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self.status, ProposalStatus::Committed { .. })
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::PendingApproval
    }

    pub fn version(&self) -> Option<u64> {
        match self.status {
            ProposalStatus::Committed { version } => version,
            ProposalStatus::PendingApproval => None,
        }
    }
}

/// Outcomes of a [`ChangeControl::propose_batch`](crate::ChangeControl::propose_batch)
/// call, in proposal order. All audit records share `batch_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: BatchId,
    pub outcomes: Vec<ProposalOutcome>,
}

impl BatchOutcome {
    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_committed()).count()
    }

    pub fn pending(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_pending()).count()
    }
}

/// A change held back until its approval request resolves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StagedChange {
    Mutation {
        entity_ref: EntityRef,
        event_type: EventType,
        new_state: Option<Record>,
    },
    Rollback {
        entity_ref: EntityRef,
        target_version: u64,
    },
    Merge {
        entity_ref: EntityRef,
        source_versions: Vec<u64>,
        merged: Record,
    },
}

impl StagedChange {
    pub fn entity_ref(&self) -> &EntityRef {
        match self {
            Self::Mutation { entity_ref, .. }
            | Self::Rollback { entity_ref, .. }
            | Self::Merge { entity_ref, .. } => entity_ref,
        }
    }
}

/// An approver's decision on a pending request.
///
/// `expected_revision` is the request revision the approver saw; a mismatch
/// fails with `StaleApprovalState`.
#[derive(Clone, Debug)]
pub enum ApprovalDecision {
    Approve {
        comments: Option<String>,
        signature: Option<Signature>,
        expected_revision: Option<u64>,
    },
    Reject {
        reason: String,
        expected_revision: Option<u64>,
    },
    Delegate {
        to: UserId,
        reason: String,
        expected_revision: Option<u64>,
    },
    Cancel {
        expected_revision: Option<u64>,
    },
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self::Approve {
            comments: None,
            signature: None,
            expected_revision: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject {
            reason: reason.into(),
            expected_revision: None,
        }
    }

    pub fn delegate(to: UserId, reason: impl Into<String>) -> Self {
        Self::Delegate {
            to,
            reason: reason.into(),
            expected_revision: None,
        }
    }

    pub fn cancel() -> Self {
        Self::Cancel {
            expected_revision: None,
        }
    }

    pub fn at_revision(mut self, revision: u64) -> Self {
        match &mut self {
            Self::Approve {
                expected_revision, ..
            }
            | Self::Reject {
                expected_revision, ..
            }
            | Self::Delegate {
                expected_revision, ..
            }
            | Self::Cancel { expected_revision } => *expected_revision = Some(revision),
        }
        self
    }

    pub fn with_comments(mut self, text: impl Into<String>) -> Self {
        if let Self::Approve { comments, .. } = &mut self {
            *comments = Some(text.into());
        }
        self
    }

    pub fn with_signature(mut self, sig: Signature) -> Self {
        if let Self::Approve { signature, .. } = &mut self {
            *signature = Some(sig);
        }
        self
    }
}

/// Result of [`ChangeControl::resolve_approval`](crate::ChangeControl::resolve_approval).
#[derive(Clone, Debug)]
pub struct Resolution {
    pub request: ApprovalRequest,
    /// The version written when the decision was the final approval.
    pub committed: Option<DataVersion>,
}
