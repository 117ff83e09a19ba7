use std::fmt;

use serde::{Deserialize, Serialize};

/// Declares a UUID v7 identifier newtype.
///
/// v7 UUIDs sort by creation time, so ids double as a coarse insertion order.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a new time-ordered identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Numeric key used when the engine audits its own rows
            /// (`EntityRef { entity_type: ApprovalRequest, entity_id }`).
            /// Taken from the random low half of the UUID.
            pub fn as_entity_id(&self) -> i64 {
                (self.0.as_u128() as u64 & i64::MAX as u64) as i64
            }

            /// Short representation (first 8 characters of the UUID).
            pub fn short_id(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of an audit record.
    AuditId
);
uuid_id!(
    /// Identifier of a stored data version.
    VersionId
);
uuid_id!(
    /// Identifier of an approval request.
    RequestId
);
uuid_id!(
    /// Groups the audit records produced by one bulk operation.
    BatchId
);
uuid_id!(
    /// Identifier of a change-log entry.
    ChangeLogId
);
uuid_id!(
    /// Identifier of a recorded notification intent.
    NotificationId
);
