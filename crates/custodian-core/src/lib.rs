//! Change control for protected records.
//!
//! [`ChangeControl`] is the single entry point for domain code. Every
//! mutation is diffed, risk-classified and written to a tamper-evident
//! audit trail. Low-risk changes commit straight into a per-entity version
//! chain; high-risk ones are staged behind a multi-step approval workflow
//! and commit only when the last step approves.
//!
//! The engine keeps no domain data of its own. Callers supply full
//! snapshots and observe results through [`ChangeHook`]s, event
//! subscriptions and the notification outbox.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hooks;
pub mod notify;
pub mod proposal;
pub mod sweeper;

pub use config::{ApproverKey, DirectoryConfig, EngineConfig, WorkflowTemplate, DEFAULT_WORKFLOW};
pub use engine::ChangeControl;
pub use error::{ChangeControlError, ChangeControlResult, ConfigError};
pub use events::{ChangeEvent, ChangeEventKind, EventFilter, EventStream};
pub use hooks::{ChangeHook, NoOpHook};
pub use notify::{NotificationIntent, NotificationKind};
pub use proposal::{
    ApprovalDecision, BatchOutcome, ChangeProposal, ProposalOutcome, ProposalStatus, Resolution,
    StagedChange,
};
pub use sweeper::EscalationSweeper;

// Re-export key types
pub use custodian_audit::{AuditContext, AuditRecord, ChangeLogEntry, PolicyRule, RiskRule};
pub use custodian_crypto::{Signature, SigningKey, VerifyingKey};
pub use custodian_types::{
    Actor, ApprovalType, AuditId, Clock, EntityKind, EntityRef, EventType, FieldValue, ManualClock,
    Record, RequestId, RequestStatus, RiskLevel, UserId,
};
pub use custodian_versions::{DataVersion, ValidationReport};
pub use custodian_workflow::{ApprovalRequest, AutoApprovalRule, WorkflowConfig, WorkflowStep};
