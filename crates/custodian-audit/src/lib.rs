//! Audit recorder for Custodian.
//!
//! Every mutation attempt against a protected record becomes one immutable
//! [`AuditRecord`]: the structural diff of the change, the acting user, a
//! risk classification, whether approval is required, and a BLAKE3 checksum
//! over `(entity_ref, event_type, old_values, new_values, created_at)`.
//!
//! Risk comes from a configurable [`RiskRuleTable`]; whether approval is
//! needed comes from a pluggable [`ApprovalPolicy`]. Records are never
//! edited. Retention soft-deletes them and writes a single housekeeping row
//! per deletion.

pub mod changelog;
pub mod error;
pub mod policy;
pub mod record;
pub mod recorder;
pub mod risk;
pub mod store;

pub use changelog::{ChangeLogEntry, ChangeLogStore, InMemoryChangeLog};
pub use error::{AuditError, AuditResult};
pub use policy::{ApprovalPolicy, NoApproval, PolicyRule, RuleBasedPolicy};
pub use record::{Assessment, AuditContext, AuditDraft, AuditRecord};
pub use recorder::{AuditRecorder, RETENTION_REASON};
pub use risk::{RiskRule, RiskRuleTable};
pub use store::{AuditStore, InMemoryAuditStore};
