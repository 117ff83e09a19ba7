//! Foundation types for Custodian, the change-control engine.
//!
//! Every other Custodian crate depends on `custodian-types`. Nothing here has
//! behavior beyond construction, comparison, and (de)serialization.
//!
//! # Key Types
//!
//! - [`EntityRef`]: `(entity_type, entity_id)` pair naming a protected record
//! - [`Actor`]: who performed an action, captured for non-repudiation
//! - [`Record`] / [`FieldValue`] / [`Decimal`]: flattened record snapshots
//! - [`EventType`], [`RiskLevel`], [`ApprovalStatus`], [`RequestStatus`]: audit vocabulary
//! - [`AuditId`], [`VersionId`], [`RequestId`], [`BatchId`]: UUID v7 identifiers
//! - [`Checksum`]: hex-encoded BLAKE3 digest
//! - [`Clock`]: injectable time source

pub mod actor;
pub mod checksum;
pub mod clock;
pub mod entity;
pub mod error;
pub mod event;
pub mod ids;
pub mod record;

pub use actor::{Actor, UserId};
pub use checksum::Checksum;
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{EntityKind, EntityRef, Snapshotable};
pub use error::TypeError;
pub use event::{ApprovalStatus, ApprovalType, EventType, Priority, RequestStatus, RiskLevel};
pub use ids::{AuditId, BatchId, ChangeLogId, NotificationId, RequestId, VersionId};
pub use record::{Decimal, FieldKind, FieldValue, Record};
