use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of mutation an audit record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
    Restored,
    BulkUpdate,
    BulkDelete,
    Import,
    Export,
    Merge,
    Split,
    Rollback,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Restored => "restored",
            Self::BulkUpdate => "bulk_update",
            Self::BulkDelete => "bulk_delete",
            Self::Import => "import",
            Self::Export => "export",
            Self::Merge => "merge",
            Self::Split => "split",
            Self::Rollback => "rollback",
        }
    }

    /// Returns `true` if the event changes stored state (and therefore
    /// carries a diff). Exports only read.
    pub fn implies_mutation(&self) -> bool {
        !matches!(self, Self::Export)
    }

    /// Returns `true` for events that reconcile against earlier versions
    /// (rollback and merge), whose states may span kind changes made over
    /// the entity's history.
    pub fn replays_history(&self) -> bool {
        matches!(self, Self::Rollback | Self::Merge)
    }

    /// Returns `true` for events that remove the record.
    pub fn is_deletion(&self) -> bool {
        matches!(self, Self::Deleted | Self::BulkDelete)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity classification of a change. Ordered: `Low < Medium < High < Critical`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Approval state recorded on an audit record at the time it was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[serde(rename = "none")]
    NotRequired,
    Pending,
    Approved,
    Rejected,
    AutoApproved,
}

/// Category of an approval request, derived from the gated event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    DataChange,
    BulkOperation,
    CriticalUpdate,
    Deletion,
    Restoration,
    Import,
    Export,
    Merge,
    Split,
}

impl ApprovalType {
    /// Pick the approval type for an event at a given risk level.
    ///
    /// Event-specific types win; a plain update becomes `CriticalUpdate`
    /// only at `Critical` risk.
    pub fn for_event(event: EventType, risk: RiskLevel) -> Self {
        match event {
            EventType::Deleted | EventType::BulkDelete => Self::Deletion,
            EventType::Restored | EventType::Rollback => Self::Restoration,
            EventType::BulkUpdate => Self::BulkOperation,
            EventType::Import => Self::Import,
            EventType::Export => Self::Export,
            EventType::Merge => Self::Merge,
            EventType::Split => Self::Split,
            EventType::Created | EventType::Updated if risk == RiskLevel::Critical => {
                Self::CriticalUpdate
            }
            EventType::Created | EventType::Updated => Self::DataChange,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataChange => "data_change",
            Self::BulkOperation => "bulk_operation",
            Self::CriticalUpdate => "critical_update",
            Self::Deletion => "deletion",
            Self::Restoration => "restoration",
            Self::Import => "import",
            Self::Export => "export",
            Self::Merge => "merge",
            Self::Split => "split",
        }
    }
}

impl fmt::Display for ApprovalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of an approval request.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn for_risk(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::Low => Self::Low,
            RiskLevel::Medium => Self::Normal,
            RiskLevel::High => Self::High,
            RiskLevel::Critical => Self::Urgent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// One level more urgent, saturating at `Urgent`.
    pub fn raised(self) -> Self {
        match self {
            Self::Low => Self::Normal,
            Self::Normal => Self::High,
            Self::High | Self::Urgent => Self::Urgent,
        }
    }
}

/// Lifecycle state of an approval request.
///
/// `Delegated` and `Escalated` are transient: a request passes through them
/// and re-enters `Pending` with a new assignee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Delegated,
    Escalated,
    Expired,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Expired | Self::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Delegated => "delegated",
            Self::Escalated => "escalated",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
