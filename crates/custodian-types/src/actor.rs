use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric user identifier issued by the host application's identity system.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Reserved identity used for engine-initiated actions (sweeps, escalations).
    pub const SYSTEM: Self = Self(0);
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// The party performing an action, captured at the time of the action.
///
/// `role` is the role the user held *when acting*; later role changes do not
/// rewrite history. Session, request, network address and user agent are
/// recorded verbatim for non-repudiation and are never interpreted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: String,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Actor {
    /// An actor with only identity and role populated.
    pub fn new(user_id: UserId, role: impl Into<String>) -> Self {
        Self {
            user_id,
            role: role.into(),
            session_id: None,
            request_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    /// The engine itself, used for sweeps and escalations.
    pub fn system() -> Self {
        Self::new(UserId::SYSTEM, "system")
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Returns `true` for the engine's own identity.
    pub fn is_system(&self) -> bool {
        self.user_id == UserId::SYSTEM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_populates_context() {
        let actor = Actor::new(UserId(7), "teacher")
            .with_session("sess-1")
            .with_request("req-9")
            .with_ip("10.0.0.5")
            .with_user_agent("backoffice/2.1");

        assert_eq!(actor.user_id, UserId(7));
        assert_eq!(actor.role, "teacher");
        assert_eq!(actor.session_id.as_deref(), Some("sess-1"));
        assert_eq!(actor.request_id.as_deref(), Some("req-9"));
        assert_eq!(actor.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(actor.user_agent.as_deref(), Some("backoffice/2.1"));
        assert!(!actor.is_system());
    }

    #[test]
    fn system_actor() {
        let actor = Actor::system();
        assert!(actor.is_system());
        assert_eq!(actor.role, "system");
    }

    #[test]
    fn user_id_display() {
        assert_eq!(UserId(42).to_string(), "user:42");
    }
}
