use custodian_audit::AuditError;
use custodian_types::EntityRef;

/// Errors produced by version store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("version {version} not found for {entity}")]
    VersionNotFound { entity: EntityRef, version: u64 },

    /// The entity's history no longer satisfies the single-current,
    /// gap-free invariant. Fatal: the entity is quarantined.
    #[error("invariant violation on {entity}: {reason}")]
    InvariantViolation { entity: EntityRef, reason: String },

    #[error("{0} is quarantined pending manual reconciliation")]
    EntityQuarantined(EntityRef),

    #[error("invalid merge on {entity}: {reason}")]
    InvalidMerge { entity: EntityRef, reason: String },

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    StoreError(String),
}

impl From<custodian_types::TypeError> for VersionError {
    fn from(err: custodian_types::TypeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience alias for version store results.
pub type VersionResult<T> = Result<T, VersionError>;
