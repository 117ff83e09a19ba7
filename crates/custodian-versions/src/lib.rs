//! Version store for Custodian.
//!
//! Keeps an ordered, hash-linked chain of full-state snapshots per protected
//! record. Numbering is gap-free from 1 and exactly one version per entity is
//! current. Rollback never rewrites history: it appends a new version whose
//! snapshot equals the target's. Merges append a single version that names
//! its source versions.
//!
//! Any write that finds the invariant broken fails with
//! [`VersionError::InvariantViolation`] and quarantines the entity until
//! [`VersionWriter::release_quarantine`] is called.

pub mod error;
pub mod memory;
pub mod traits;
pub mod validation;
pub mod version;

pub use error::{VersionError, VersionResult};
pub use memory::InMemoryVersionStore;
pub use traits::{VersionReader, VersionWriter};
pub use validation::{validate_history, ValidationReport, Violation, ViolationKind};
pub use version::{DataVersion, RecordedVersion};
