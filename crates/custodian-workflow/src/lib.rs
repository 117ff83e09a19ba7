//! Approval workflow for Custodian.
//!
//! A change that requires approval is parked behind an [`ApprovalRequest`]
//! that walks an ordered list of [`WorkflowStep`]s. Requests can be
//! delegated, escalated when overdue, cancelled by their requester, or
//! created already approved when an [`AutoApprovalRule`] matches.
//!
//! Every state transition is itself audited through the audit recorder,
//! parented on the audit record of the change being gated.

pub mod directory;
pub mod error;
pub mod request;
pub mod step;
pub mod workflow;

pub use directory::{ApproverDirectory, StaticDirectory};
pub use error::{WorkflowError, WorkflowResult};
pub use request::{ApprovalComment, ApprovalRequest, DelegationEntry, Transition, TransitionAction};
pub use step::{AutoApprovalRule, StepResolver, WorkflowConfig, WorkflowStep};
pub use workflow::ApprovalWorkflow;
