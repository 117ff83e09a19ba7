use std::sync::Mutex;

use chrono::{DateTime, Utc};
use custodian_types::{EntityRef, NotificationId, RequestId, UserId};
use serde::{Deserialize, Serialize};

/// Why someone should be told about a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A request landed in the recipient's queue.
    ApprovalRequested,
    /// A request was delegated to the recipient.
    Delegated,
    /// An overdue request was escalated to the recipient.
    Escalated,
    Approved,
    Rejected,
    Expired,
    Cancelled,
}

/// A notification that should be delivered. The engine records intents
/// only; delivery belongs to the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub id: NotificationId,
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub request_id: RequestId,
    pub entity_ref: EntityRef,
    pub created_at: DateTime<Utc>,
}

impl NotificationIntent {
    pub fn new(
        recipient: UserId,
        kind: NotificationKind,
        request_id: RequestId,
        entity_ref: EntityRef,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            recipient,
            kind,
            request_id,
            entity_ref,
            created_at,
        }
    }
}

/// In-process queue of undelivered intents.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    queue: Mutex<Vec<NotificationIntent>>,
}

impl Outbox {
    pub(crate) fn push(&self, intent: NotificationIntent) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(intent);
    }

    pub(crate) fn pending(&self) -> Vec<NotificationIntent> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn drain(&self) -> Vec<NotificationIntent> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }
}
