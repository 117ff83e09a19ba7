//! Risk classification.
//!
//! A [`RiskRuleTable`] maps `(entity kind, changed fields, event type)` to a
//! [`RiskLevel`]. Every matching rule is evaluated and the highest level
//! wins, so rule order never matters.

use custodian_diff::FieldDiff;
use custodian_types::{EntityKind, EventType, RiskLevel};
use serde::{Deserialize, Serialize};

/// A single classification rule. Empty selectors match anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRule {
    pub name: String,
    #[serde(default)]
    pub entity_types: Vec<EntityKind>,
    #[serde(default)]
    pub event_types: Vec<EventType>,
    /// Matches when any of these fields (or a field nested under one of
    /// them) changed.
    #[serde(default)]
    pub fields: Vec<String>,
    pub level: RiskLevel,
}

impl RiskRule {
    pub fn new(name: impl Into<String>, level: RiskLevel) -> Self {
        Self {
            name: name.into(),
            entity_types: Vec::new(),
            event_types: Vec::new(),
            fields: Vec::new(),
            level,
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

    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn matches(&self, entity: &EntityKind, event: EventType, diff: &FieldDiff) -> bool {
        (self.entity_types.is_empty() || self.entity_types.contains(entity))
            && (self.event_types.is_empty() || self.event_types.contains(&event))
            && (self.fields.is_empty() || self.fields.iter().any(|f| diff.touches_prefix(f)))
    }
}

/// Configurable rule table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRuleTable {
    #[serde(default)]
    pub rules: Vec<RiskRule>,
}

impl RiskRuleTable {
    pub fn new(rules: Vec<RiskRule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: RiskRule) {
        self.rules.push(rule);
    }

    /// Classify a change. Defaults to `Low`; deletions are at least
    /// `Medium`.
    pub fn classify(&self, entity: &EntityKind, event: EventType, diff: &FieldDiff) -> RiskLevel {
        let floor = if event.is_deletion() {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        self.rules
            .iter()
            .filter(|rule| rule.matches(entity, event, diff))
            .map(|rule| rule.level)
            .fold(floor, RiskLevel::max)
    }
}
