//! Error types for the diff crate.

use custodian_types::FieldKind;

/// Errors that can occur during diff operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// The same field holds values of incompatible kinds in the two states.
    /// This points at a schema bug upstream and is never silently coerced.
    /// Rollback and merge compare against stored history and use
    /// [`crate::diff_lenient`] instead.
    #[error("shape mismatch on field '{field}': {old_kind} vs {new_kind}")]
    ShapeMismatch {
        field: String,
        old_kind: FieldKind,
        new_kind: FieldKind,
    },
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
