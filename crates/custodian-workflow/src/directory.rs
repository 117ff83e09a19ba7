use std::collections::{HashMap, HashSet};

use custodian_crypto::VerifyingKey;
use custodian_types::UserId;

/// Resolves roles to approvers. Supplied by the host application, which
/// owns identity.
pub trait ApproverDirectory: Send + Sync {
    /// The user currently holding `role`.
    fn resolve_role(&self, role: &str) -> Option<UserId>;

    /// The higher authority for `role` at escalation `level` (1-based).
    /// `None` means nobody is left to escalate to.
    fn escalation_target(&self, role: &str, level: u32) -> Option<UserId>;

    /// Registered public key for approval signatures.
    fn verifying_key(&self, user: UserId) -> Option<VerifyingKey>;

    /// Administrators may cancel requests they did not submit.
    fn is_admin(&self, user: UserId) -> bool;
}

/// A fixed directory, typically built from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    roles: HashMap<String, UserId>,
    escalation: HashMap<String, Vec<UserId>>,
    keys: HashMap<UserId, VerifyingKey>,
    admins: HashSet<UserId>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: impl Into<String>, user: UserId) -> Self {
        self.roles.insert(role.into(), user);
        self
    }

    /// Escalation chain for a role: level 1 goes to `chain[0]`, and so on.
    pub fn with_escalation(mut self, role: impl Into<String>, chain: Vec<UserId>) -> Self {
        self.escalation.insert(role.into(), chain);
        self
    }

    pub fn with_key(mut self, user: UserId, key: VerifyingKey) -> Self {
        self.keys.insert(user, key);
        self
    }

    pub fn with_admin(mut self, user: UserId) -> Self {
        self.admins.insert(user);
        self
    }
}

impl ApproverDirectory for StaticDirectory {
    fn resolve_role(&self, role: &str) -> Option<UserId> {
        self.roles.get(role).copied()
    }

    fn escalation_target(&self, role: &str, level: u32) -> Option<UserId> {
        let index = usize::try_from(level).ok()?.checked_sub(1)?;
        self.escalation.get(role)?.get(index).copied()
    }

    fn verifying_key(&self, user: UserId) -> Option<VerifyingKey> {
        self.keys.get(&user).cloned()
    }

    fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }
}
