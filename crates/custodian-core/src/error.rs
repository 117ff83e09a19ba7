use custodian_audit::AuditError;
use custodian_diff::DiffError;
use custodian_types::{ApprovalType, EntityRef, FieldKind, RequestId, RequestStatus, UserId};
use custodian_versions::VersionError;
use custodian_workflow::WorkflowError;

/// Errors surfaced by the change-control facade.
///
/// The first six variants are the caller-facing taxonomy; component errors
/// that carry one of them are unwrapped into it so callers can match on a
/// single level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeControlError {
    #[error("nothing to audit for {entity}: both states are empty")]
    InvalidAuditEvent { entity: EntityRef },

    #[error("field '{field}' changed shape from {old_kind} to {new_kind}")]
    ShapeMismatch {
        field: String,
        old_kind: FieldKind,
        new_kind: FieldKind,
    },

    #[error("{actor} is not authorized on request {request_id}: {reason}")]
    NotAuthorized {
        request_id: RequestId,
        actor: UserId,
        reason: String,
    },

    #[error("approval request {request_id} is stale: {detail}")]
    StaleApprovalState { request_id: RequestId, detail: String },

    #[error("version {version} not found for {entity}")]
    VersionNotFound { entity: EntityRef, version: u64 },

    #[error("invariant violation on {entity}: {reason}")]
    InvariantViolation { entity: EntityRef, reason: String },

    #[error("{0} is quarantined pending manual reconciliation")]
    EntityQuarantined(EntityRef),

    #[error("no workflow configured for {0} approvals")]
    NoWorkflow(ApprovalType),

    #[error("no staged change for request {0}")]
    StagedChangeMissing(RequestId),

    #[error("request {request_id} is {status}, not approved")]
    NotApproved {
        request_id: RequestId,
        status: RequestStatus,
    },

    #[error(transparent)]
    Audit(AuditError),

    #[error(transparent)]
    Version(VersionError),

    #[error(transparent)]
    Workflow(WorkflowError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    StoreError(String),
}

impl ChangeControlError {
    /// The caller can re-derive its state and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. } | Self::StaleApprovalState { .. }
        )
    }

    /// The entity's integrity guarantees no longer hold. Writes stay
    /// blocked until the entity is reconciled and released.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. } | Self::EntityQuarantined(_)
        )
    }
}

impl From<DiffError> for ChangeControlError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::ShapeMismatch {
                field,
                old_kind,
                new_kind,
            } => Self::ShapeMismatch {
                field,
                old_kind,
                new_kind,
            },
        }
    }
}

impl From<AuditError> for ChangeControlError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::InvalidAuditEvent { entity } => Self::InvalidAuditEvent { entity },
            AuditError::Diff(diff) => diff.into(),
            other => Self::Audit(other),
        }
    }
}

impl From<VersionError> for ChangeControlError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::VersionNotFound { entity, version } => {
                Self::VersionNotFound { entity, version }
            }
            VersionError::InvariantViolation { entity, reason } => {
                Self::InvariantViolation { entity, reason }
            }
            VersionError::EntityQuarantined(entity) => Self::EntityQuarantined(entity),
            VersionError::Audit(audit) => audit.into(),
            other => Self::Version(other),
        }
    }
}

impl From<WorkflowError> for ChangeControlError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::NotAuthorized {
                request_id,
                actor,
                reason,
            } => Self::NotAuthorized {
                request_id,
                actor,
                reason,
            },
            WorkflowError::StaleApprovalState { request_id, detail } => {
                Self::StaleApprovalState { request_id, detail }
            }
            WorkflowError::Audit(audit) => audit.into(),
            other => Self::Workflow(other),
        }
    }
}

/// Errors loading or applying an [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("invalid verifying key for user {user}: {reason}")]
    InvalidKey { user: i64, reason: String },
}

/// Convenience alias for facade results.
pub type ChangeControlResult<T> = Result<T, ChangeControlError>;
