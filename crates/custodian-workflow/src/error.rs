use chrono::{DateTime, Utc};
use custodian_audit::AuditError;
use custodian_types::{RequestId, UserId};

/// Errors produced by the approval workflow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("approval request {0} not found")]
    RequestNotFound(RequestId),

    #[error("{actor} is not authorized on request {request_id}: {reason}")]
    NotAuthorized {
        request_id: RequestId,
        actor: UserId,
        reason: String,
    },

    /// The request moved on since the caller last read it. Re-read and
    /// retry.
    #[error("approval request {request_id} is stale: {detail}")]
    StaleApprovalState { request_id: RequestId, detail: String },

    #[error("step {step} of request {request_id} does not allow delegation")]
    DelegationNotAllowed { request_id: RequestId, step: u32 },

    #[error("request {request_id} is not overdue (deadline {deadline})")]
    NotOverdue {
        request_id: RequestId,
        deadline: DateTime<Utc>,
    },

    #[error("step {step} of request {request_id} requires a signature")]
    SignatureRequired { request_id: RequestId, step: u32 },

    #[error("invalid approval signature on request {0}")]
    InvalidSignature(RequestId),

    #[error("no approver resolves for role '{0}'")]
    NoApprover(String),

    /// A configured hour count pushes a deadline past the representable
    /// date range.
    #[error("deadline {hours}h after {from} is out of range")]
    DeadlineOutOfRange { from: DateTime<Utc>, hours: u32 },

    #[error("workflow '{0}' has no steps")]
    EmptyWorkflow(String),

    #[error("no auto-approval rule matches")]
    NotAutoApprovable,

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    StoreError(String),
}

impl WorkflowError {
    pub(crate) fn stale(request_id: RequestId, detail: impl Into<String>) -> Self {
        Self::StaleApprovalState {
            request_id,
            detail: detail.into(),
        }
    }

    pub(crate) fn not_authorized(
        request_id: RequestId,
        actor: UserId,
        reason: impl Into<String>,
    ) -> Self {
        Self::NotAuthorized {
            request_id,
            actor,
            reason: reason.into(),
        }
    }
}

impl From<custodian_crypto::HasherError> for WorkflowError {
    fn from(err: custodian_crypto::HasherError) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience alias for workflow results.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
