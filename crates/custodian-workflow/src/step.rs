use custodian_types::{EntityKind, EventType, RiskLevel, UserId};
use serde::{Deserialize, Serialize};

/// How the approver of a step is chosen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResolver {
    /// A fixed user.
    User(UserId),
    /// Whoever the directory maps the role to at submission time.
    Role(String),
}

/// One required approval level, e.g. `department_head` then `principal`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    pub resolver: StepResolver,
    #[serde(default)]
    pub can_delegate: bool,
    #[serde(default)]
    pub require_signature: bool,
}

impl WorkflowStep {
    /// A step resolved through the directory by role, named after the role.
    pub fn role(role: impl Into<String>) -> Self {
        let role = role.into();
        Self {
            name: role.clone(),
            resolver: StepResolver::Role(role),
            can_delegate: false,
            require_signature: false,
        }
    }

    pub fn user(name: impl Into<String>, user: UserId) -> Self {
        Self {
            name: name.into(),
            resolver: StepResolver::User(user),
            can_delegate: false,
            require_signature: false,
        }
    }

    pub fn delegable(mut self) -> Self {
        self.can_delegate = true;
        self
    }

    pub fn signed(mut self) -> Self {
        self.require_signature = true;
        self
    }

    /// The role used to look up escalation targets.
    pub fn escalation_role(&self) -> &str {
        match &self.resolver {
            StepResolver::Role(role) => role,
            StepResolver::User(_) => &self.name,
        }
    }
}

fn default_deadline_hours() -> u32 {
    72
}

fn default_escalation_hours() -> u32 {
    24
}

/// An ordered approval chain with its deadline windows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    /// Time each step has before the request becomes overdue.
    #[serde(default = "default_deadline_hours")]
    pub deadline_hours: u32,
    /// Extra time granted after each escalation.
    #[serde(default = "default_escalation_hours")]
    pub escalation_hours: u32,
}

impl WorkflowConfig {
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            name: name.into(),
            steps,
            deadline_hours: default_deadline_hours(),
            escalation_hours: default_escalation_hours(),
        }
    }

    pub fn with_deadline_hours(mut self, hours: u32) -> Self {
        self.deadline_hours = hours;
        self
    }

    pub fn with_escalation_hours(mut self, hours: u32) -> Self {
        self.escalation_hours = hours;
        self
    }
}

/// Lets a change skip manual approval. Empty selectors match anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoApprovalRule {
    pub name: String,
    /// Highest risk the rule accepts.
    #[serde(default)]
    pub max_risk: RiskLevel,
    #[serde(default)]
    pub actor_roles: Vec<String>,
    #[serde(default)]
    pub entity_types: Vec<EntityKind>,
    #[serde(default)]
    pub event_types: Vec<EventType>,
}

impl AutoApprovalRule {
    pub fn new(name: impl Into<String>, max_risk: RiskLevel) -> Self {
        Self {
            name: name.into(),
            max_risk,
            actor_roles: Vec::new(),
            entity_types: Vec::new(),
            event_types: Vec::new(),
        }
    }

    pub fn for_role(mut self, role: impl Into<String>) -> Self {
        self.actor_roles.push(role.into());
        self
    }

    pub fn for_entity(mut self, kind: EntityKind) -> Self {
        self.entity_types.push(kind);
        self
    }

    pub fn for_event(mut self, event: EventType) -> Self {
        self.event_types.push(event);
        self
    }

    pub fn matches(
        &self,
        entity: &EntityKind,
        event: EventType,
        risk: RiskLevel,
        actor_role: &str,
    ) -> bool {
        risk <= self.max_risk
            && (self.actor_roles.is_empty() || self.actor_roles.iter().any(|r| r == actor_role))
            && (self.entity_types.is_empty() || self.entity_types.contains(entity))
            && (self.event_types.is_empty() || self.event_types.contains(&event))
    }
}
