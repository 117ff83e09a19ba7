//! Diff engine for Custodian.
//!
//! Computes the structural difference between two record states for audit
//! payloads, and line-level differences between free-text notes for the
//! change log. Everything here is a pure function.
//!
//! # Key Types
//!
//! - [`FieldDiff`] / [`FieldChange`] -- changed fields with old and new values
//! - [`LineDiff`] / [`LineHunk`] / [`DiffLine`] -- line diff of free text

pub mod error;
pub mod field_diff;
pub mod text_diff;

pub use error::{DiffError, DiffResult};
pub use field_diff::{diff, diff_lenient, FieldChange, FieldDiff};
pub use text_diff::{diff_text, DiffLine, LineDiff, LineHunk};
