use std::sync::RwLock;

use chrono::{DateTime, Utc};
use custodian_types::{AuditId, EntityKind, EntityRef, RequestId, RequestStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEventKind {
    Committed,
    ApprovalRequested,
    /// The request moved to another assignee: next step or delegation.
    ApprovalReassigned,
    ApprovalResolved,
    Escalated,
    RolledBack,
    Merged,
}

/// A state change published to subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeEventKind,
    pub entity_ref: EntityRef,
    pub audit_id: Option<AuditId>,
    pub request_id: Option<RequestId>,
    /// Request status after the change, for approval events.
    pub request_status: Option<RequestStatus>,
    /// Resulting version number, for commits, rollbacks and merges.
    pub version: Option<u64>,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeEventKind, entity_ref: EntityRef, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            entity_ref,
            audit_id: None,
            request_id: None,
            request_status: None,
            version: None,
            at,
        }
    }

    pub fn with_audit(mut self, audit_id: AuditId) -> Self {
        self.audit_id = Some(audit_id);
        self
    }

    pub fn with_request(mut self, request_id: RequestId, status: RequestStatus) -> Self {
        self.request_id = Some(request_id);
        self.request_status = Some(status);
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }
}

/// Filter for subscribing to a subset of change events.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// If set, only events for these entity kinds are delivered.
    pub entity_types: Option<Vec<EntityKind>>,
    /// If set, only events for these exact records are delivered.
    pub entities: Option<Vec<EntityRef>>,
    /// If set, only events of these kinds are delivered.
    pub kinds: Option<Vec<ChangeEventKind>>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_entity(entity: EntityRef) -> Self {
        Self {
            entities: Some(vec![entity]),
            ..Self::default()
        }
    }

    pub fn for_kinds(kinds: Vec<ChangeEventKind>) -> Self {
        Self {
            kinds: Some(kinds),
            ..Self::default()
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(ref types) = self.entity_types {
            if !types.contains(&event.entity_ref.entity_type) {
                return false;
            }
        }
        if let Some(ref entities) = self.entities {
            if !entities.contains(&event.entity_ref) {
                return false;
            }
        }
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        true
    }
}

/// A broadcast receiver for change events.
pub type EventStream = broadcast::Receiver<ChangeEvent>;

struct Subscriber {
    filter: EventFilter,
    sender: broadcast::Sender<ChangeEvent>,
}

/// Fan-out router delivering events to matching subscribers.
pub(crate) struct EventRouter {
    subscribers: RwLock<Vec<Subscriber>>,
    capacity: usize,
}

impl EventRouter {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn subscribe(&self, filter: EventFilter) -> EventStream {
        let (sender, rx) = broadcast::channel(self.capacity);
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber { filter, sender });
        rx
    }

    /// Deliver to every matching subscriber. Subscribers whose receivers
    /// are gone are pruned.
    pub(crate) fn route(&self, event: &ChangeEvent) {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subs.retain(|sub| {
            if sub.filter.matches(event) {
                sub.sender.send(event.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
