use custodian_diff::DiffError;
use custodian_types::{AuditId, EntityRef};

/// Errors produced by the audit recorder and audit stores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// Both the old and the new state were absent: nothing to record.
    #[error("invalid audit event for {entity}: old and new state are both empty")]
    InvalidAuditEvent { entity: EntityRef },

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("audit record {0} not found")]
    NotFound(AuditId),

    #[error("audit record {0} already exists")]
    DuplicateId(AuditId),

    #[error("audit record {0} is already soft-deleted")]
    AlreadyDeleted(AuditId),

    /// Housekeeping rows are the last level of the chain and are never
    /// themselves soft-deleted.
    #[error("audit record {0} is a housekeeping record and cannot be soft-deleted")]
    HousekeepingImmutable(AuditId),

    #[error("checksum mismatch on audit record {id}")]
    ChecksumMismatch { id: AuditId },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    StoreError(String),
}

impl From<custodian_crypto::HasherError> for AuditError {
    fn from(err: custodian_crypto::HasherError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<custodian_types::TypeError> for AuditError {
    fn from(err: custodian_types::TypeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience alias for audit results.
pub type AuditResult<T> = Result<T, AuditError>;
