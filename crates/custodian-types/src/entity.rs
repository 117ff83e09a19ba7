use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::record::Record;

/// The kind of a protected record.
///
/// A small closed set of known school entities plus `Custom` for
/// deployment-specific tables. `ApprovalRequest` and `AuditRecord` are
/// engine-internal: the engine audits its own housekeeping under them and
/// never gates them behind approval.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Student,
    ClassData,
    ClassRoster,
    ExamPaper,
    ExamResult,
    TeacherDocument,
    FeePayment,
    PayrollRecord,
    AttendanceRecord,
    InventoryItem,
    LibraryLoan,
    ApprovalRequest,
    AuditRecord,
    Custom(String),
}

impl EntityKind {
    /// Stable snake_case name, used in display and rule matching.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Student => "student",
            Self::ClassData => "class_data",
            Self::ClassRoster => "class_roster",
            Self::ExamPaper => "exam_paper",
            Self::ExamResult => "exam_result",
            Self::TeacherDocument => "teacher_document",
            Self::FeePayment => "fee_payment",
            Self::PayrollRecord => "payroll_record",
            Self::AttendanceRecord => "attendance_record",
            Self::InventoryItem => "inventory_item",
            Self::LibraryLoan => "library_loan",
            Self::ApprovalRequest => "approval_request",
            Self::AuditRecord => "audit_record",
            Self::Custom(name) => name,
        }
    }

    /// Returns `true` for kinds the engine uses for its own bookkeeping.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::ApprovalRequest | Self::AuditRecord)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "student" => Self::Student,
            "class_data" => Self::ClassData,
            "class_roster" => Self::ClassRoster,
            "exam_paper" => Self::ExamPaper,
            "exam_result" => Self::ExamResult,
            "teacher_document" => Self::TeacherDocument,
            "fee_payment" => Self::FeePayment,
            "payroll_record" => Self::PayrollRecord,
            "attendance_record" => Self::AttendanceRecord,
            "inventory_item" => Self::InventoryItem,
            "library_loan" => Self::LibraryLoan,
            "approval_request" => Self::ApprovalRequest,
            "audit_record" => Self::AuditRecord,
            other => Self::Custom(other.to_string()),
        })
    }
}

/// Reference to a protected record: the join key across audit records,
/// data versions and approval requests.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityKind,
    pub entity_id: i64,
}

impl EntityRef {
    pub fn new(entity_type: EntityKind, entity_id: i64) -> Self {
        Self {
            entity_type,
            entity_id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.entity_id)
    }
}

/// A domain type that can be placed under change control.
///
/// The default [`snapshot`](Self::snapshot) serializes the value with serde
/// and flattens it into a [`Record`]; override it when the persisted shape
/// should differ from the in-memory one.
pub trait Snapshotable: Serialize {
    /// The reference under which this value's history is kept.
    fn entity_ref(&self) -> EntityRef;

    /// Full-state snapshot of the value.
    fn snapshot(&self) -> Result<Record, TypeError> {
        Record::from_serializable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    #[test]
    fn kind_names_roundtrip_through_from_str() {
        for kind in [
            EntityKind::Student,
            EntityKind::ExamResult,
            EntityKind::PayrollRecord,
            EntityKind::AuditRecord,
        ] {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn unknown_kind_is_custom() {
        let parsed: EntityKind = "hostel_room".parse().unwrap();
        assert_eq!(parsed, EntityKind::Custom("hostel_room".into()));
        assert_eq!(parsed.as_str(), "hostel_room");
    }

    #[test]
    fn internal_kinds() {
        assert!(EntityKind::ApprovalRequest.is_internal());
        assert!(EntityKind::AuditRecord.is_internal());
        assert!(!EntityKind::Student.is_internal());
    }

    #[test]
    fn entity_ref_display() {
        let r = EntityRef::new(EntityKind::ExamResult, 42);
        assert_eq!(r.to_string(), "exam_result#42");
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&EntityKind::TeacherDocument).unwrap();
        assert_eq!(json, "\"teacher_document\"");
    }

    #[derive(Serialize)]
    struct Mark {
        id: i64,
        subject: String,
        score: u32,
    }

    impl Snapshotable for Mark {
        fn entity_ref(&self) -> EntityRef {
            EntityRef::new(EntityKind::ExamResult, self.id)
        }
    }

    #[test]
    fn default_snapshot_flattens_fields() {
        let mark = Mark {
            id: 3,
            subject: "physics".into(),
            score: 81,
        };
        let snapshot = mark.snapshot().unwrap();
        assert_eq!(snapshot.get("score"), Some(&FieldValue::Integer(81)));
        assert_eq!(mark.entity_ref().entity_id, 3);
    }
}
