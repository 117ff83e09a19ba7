use custodian_types::{EntityKind, EventType, RiskLevel};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ApprovalPolicy
// ---------------------------------------------------------------------------

/// Decides whether a classified change must pass through approval.
///
/// Supplied by the host application. Any `Fn(&EntityKind, EventType,
/// RiskLevel) -> bool` closure is a policy.
pub trait ApprovalPolicy: Send + Sync {
    fn requires_approval(&self, entity: &EntityKind, event: EventType, risk: RiskLevel) -> bool;
}

impl<F> ApprovalPolicy for F
where
    F: Fn(&EntityKind, EventType, RiskLevel) -> bool + Send + Sync,
{
    fn requires_approval(&self, entity: &EntityKind, event: EventType, risk: RiskLevel) -> bool {
        self(entity, event, risk)
    }
}

/// Never requires approval.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoApproval;

impl ApprovalPolicy for NoApproval {
    fn requires_approval(&self, _: &EntityKind, _: EventType, _: RiskLevel) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// RuleBasedPolicy
// ---------------------------------------------------------------------------

/// One approval requirement. Empty selectors match anything; `min_risk`
/// defaults to `Low`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    #[serde(default)]
    pub entity_types: Vec<EntityKind>,
    #[serde(default)]
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub min_risk: RiskLevel,
}

impl PolicyRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_types: Vec::new(),
            event_types: Vec::new(),
            min_risk: RiskLevel::Low,
        }
    }

    pub fn for_entity(mut self, kind: EntityKind) -> Self {
        self.entity_types.push(kind);
        self
    }

    pub fn for_event(mut self, event: EventType) -> Self {
        self.event_types.push(event);
        self
    }

    pub fn at_or_above(mut self, risk: RiskLevel) -> Self {
        self.min_risk = risk;
        self
    }

    fn matches(&self, entity: &EntityKind, event: EventType, risk: RiskLevel) -> bool {
        (self.entity_types.is_empty() || self.entity_types.contains(entity))
            && (self.event_types.is_empty() || self.event_types.contains(&event))
            && risk >= self.min_risk
    }
}

/// Requires approval when any rule matches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBasedPolicy {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl RuleBasedPolicy {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// Require approval for everything at or above `risk`.
    pub fn risk_threshold(risk: RiskLevel) -> Self {
        Self::new(vec![PolicyRule::new("risk threshold").at_or_above(risk)])
    }

    /// The first matching rule, if any.
    pub fn matching_rule(
        &self,
        entity: &EntityKind,
        event: EventType,
        risk: RiskLevel,
    ) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.matches(entity, event, risk))
    }
}

impl ApprovalPolicy for RuleBasedPolicy {
    fn requires_approval(&self, entity: &EntityKind, event: EventType, risk: RiskLevel) -> bool {
        let matched = self.matching_rule(entity, event, risk);
        if let Some(rule) = matched {
            tracing::debug!(rule = %rule.name, entity = %entity, event = %event, %risk, "approval required");
        }
        matched.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_approval_never_requires() {
        assert!(!NoApproval.requires_approval(
            &EntityKind::ExamResult,
            EventType::Deleted,
            RiskLevel::Critical
        ));
    }

    #[test]
    fn closure_is_a_policy() {
        let policy = |_: &EntityKind, event: EventType, _: RiskLevel| event.is_deletion();
        assert!(policy.requires_approval(&EntityKind::Student, EventType::Deleted, RiskLevel::Low));
        assert!(!policy.requires_approval(&EntityKind::Student, EventType::Updated, RiskLevel::Low));
    }

    #[test]
    fn risk_threshold() {
        let policy = RuleBasedPolicy::risk_threshold(RiskLevel::High);
        assert!(!policy.requires_approval(
            &EntityKind::Student,
            EventType::Updated,
            RiskLevel::Medium
        ));
        assert!(policy.requires_approval(
            &EntityKind::Student,
            EventType::Updated,
            RiskLevel::High
        ));
        assert!(policy.requires_approval(
            &EntityKind::Student,
            EventType::Updated,
            RiskLevel::Critical
        ));
    }

    #[test]
    fn rules_scope_by_entity_and_event() {
        let policy = RuleBasedPolicy::new(vec![
            PolicyRule::new("exam results")
                .for_entity(EntityKind::ExamResult)
                .at_or_above(RiskLevel::High),
            PolicyRule::new("payroll deletions")
                .for_entity(EntityKind::PayrollRecord)
                .for_event(EventType::Deleted),
        ]);

        assert!(policy.requires_approval(
            &EntityKind::ExamResult,
            EventType::Updated,
            RiskLevel::Critical
        ));
        assert!(!policy.requires_approval(
            &EntityKind::Student,
            EventType::Updated,
            RiskLevel::Critical
        ));
        assert!(policy.requires_approval(
            &EntityKind::PayrollRecord,
            EventType::Deleted,
            RiskLevel::Medium
        ));
        assert!(!policy.requires_approval(
            &EntityKind::PayrollRecord,
            EventType::Updated,
            RiskLevel::Medium
        ));
    }
}
