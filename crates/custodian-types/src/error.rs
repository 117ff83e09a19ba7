use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid decimal literal: {0}")]
    InvalidDecimal(String),

    #[error("record root must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
