use std::collections::BTreeMap;
use std::path::Path;

use custodian_audit::{PolicyRule, RiskRule, RiskRuleTable, RuleBasedPolicy};
use custodian_crypto::VerifyingKey;
use custodian_types::{ApprovalType, UserId};
use custodian_workflow::{AutoApprovalRule, StaticDirectory, WorkflowConfig, WorkflowStep};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Key under [`EngineConfig::workflows`] used when no template is
/// registered for an approval type.
pub const DEFAULT_WORKFLOW: &str = "default";

/// Engine configuration, usually loaded from TOML.
///
/// The default is permissive: no risk rules, no approval rules, so every
/// proposal commits immediately.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub risk_rules: Vec<RiskRule>,
    pub approval_rules: Vec<PolicyRule>,
    pub auto_approval: Vec<AutoApprovalRule>,
    /// Workflow templates keyed by approval type (`critical_update`,
    /// `deletion`, ...) or [`DEFAULT_WORKFLOW`].
    pub workflows: BTreeMap<String, WorkflowTemplate>,
    pub deadline_hours: u32,
    pub escalation_hours: u32,
    pub directory: DirectoryConfig,
    /// Buffer size of each event subscription.
    pub event_capacity: usize,
    /// Period of the escalation sweeper.
    pub sweep_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk_rules: Vec::new(),
            approval_rules: Vec::new(),
            auto_approval: Vec::new(),
            workflows: BTreeMap::new(),
            deadline_hours: 72,
            escalation_hours: 24,
            directory: DirectoryConfig::default(),
            event_capacity: 256,
            sweep_interval_secs: 300,
        }
    }
}

/// Approval steps with optional per-template deadline windows. Missing
/// windows fall back to the engine-wide values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub deadline_hours: Option<u32>,
    #[serde(default)]
    pub escalation_hours: Option<u32>,
}

/// Role assignments, escalation chains, approver keys and administrators.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub roles: BTreeMap<String, i64>,
    pub escalation: BTreeMap<String, Vec<i64>>,
    pub admins: Vec<i64>,
    pub keys: Vec<ApproverKey>,
}

/// A registered Ed25519 public key, hex encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverKey {
    pub user: i64,
    pub public_key: String,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn risk_table(&self) -> RiskRuleTable {
        RiskRuleTable::new(self.risk_rules.clone())
    }

    pub fn approval_policy(&self) -> RuleBasedPolicy {
        RuleBasedPolicy::new(self.approval_rules.clone())
    }

    /// The workflow gating changes of `approval_type`, falling back to the
    /// default template.
    pub fn workflow_for(&self, approval_type: ApprovalType) -> Option<WorkflowConfig> {
        let (name, template) = self
            .workflows
            .get_key_value(approval_type.as_str())
            .or_else(|| self.workflows.get_key_value(DEFAULT_WORKFLOW))?;
        Some(
            WorkflowConfig::new(name.clone(), template.steps.clone())
                .with_deadline_hours(template.deadline_hours.unwrap_or(self.deadline_hours))
                .with_escalation_hours(template.escalation_hours.unwrap_or(self.escalation_hours)),
        )
    }

    /// Register a workflow template. Builder-style, mostly for tests and
    /// embedding without a config file.
    pub fn with_workflow(mut self, key: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        self.workflows.insert(
            key.into(),
            WorkflowTemplate {
                steps,
                deadline_hours: None,
                escalation_hours: None,
            },
        );
        self
    }
}

impl DirectoryConfig {
    pub fn to_directory(&self) -> Result<StaticDirectory, ConfigError> {
        let mut directory = StaticDirectory::new();
        for (role, user) in &self.roles {
            directory = directory.with_role(role.clone(), UserId(*user));
        }
        for (role, chain) in &self.escalation {
            directory = directory
                .with_escalation(role.clone(), chain.iter().copied().map(UserId).collect());
        }
        for admin in &self.admins {
            directory = directory.with_admin(UserId(*admin));
        }
        for key in &self.keys {
            let verifying =
                VerifyingKey::from_hex(&key.public_key).map_err(|e| ConfigError::InvalidKey {
                    user: key.user,
                    reason: e.to_string(),
                })?;
            directory = directory.with_key(UserId(key.user), verifying);
        }
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_crypto::SigningKey;
    use custodian_types::{EntityKind, EventType, RiskLevel};
    use custodian_audit::ApprovalPolicy;
    use custodian_workflow::ApproverDirectory;

    const SAMPLE: &str = r#"
        deadline_hours = 48

        [[risk_rules]]
        name = "posted grades"
        level = "critical"
        entity_types = ["exam_result"]
        fields = ["grade"]

        [[approval_rules]]
        name = "high risk"
        min_risk = "high"

        [[auto_approval]]
        name = "admin low risk"
        max_risk = "low"
        actor_roles = ["admin"]

        [workflows.critical_update]
        steps = [
            { name = "department_head", resolver = { role = "department_head" }, can_delegate = true },
            { name = "principal", resolver = { role = "principal" } },
        ]
        escalation_hours = 12

        [workflows.default]
        steps = [{ name = "principal", resolver = { role = "principal" } }]

        [directory]
        admins = [99]

        [directory.roles]
        department_head = 20
        principal = 1

        [directory.escalation]
        department_head = [30]
    "#;

    #[test]
    fn default_is_permissive() {
        let config = EngineConfig::default();
        assert!(config.risk_rules.is_empty());
        assert!(config.approval_rules.is_empty());
        assert_eq!(config.deadline_hours, 72);
        assert_eq!(config.escalation_hours, 24);
        assert!(config.workflow_for(ApprovalType::DataChange).is_none());
        assert!(!config.approval_policy().requires_approval(
            &EntityKind::ExamResult,
            EventType::Updated,
            RiskLevel::Critical
        ));
    }

    #[test]
    fn parses_sample() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.risk_rules.len(), 1);
        assert_eq!(config.risk_rules[0].level, RiskLevel::Critical);
        assert_eq!(config.auto_approval[0].actor_roles, vec!["admin".to_string()]);
        assert_eq!(config.sweep_interval_secs, 300);

        let critical = config.workflow_for(ApprovalType::CriticalUpdate).unwrap();
        assert_eq!(critical.name, "critical_update");
        assert_eq!(critical.steps.len(), 2);
        assert_eq!(critical.deadline_hours, 48);
        assert_eq!(critical.escalation_hours, 12);

        let fallback = config.workflow_for(ApprovalType::Deletion).unwrap();
        assert_eq!(fallback.name, DEFAULT_WORKFLOW);
        assert_eq!(fallback.escalation_hours, 24);
    }

    #[test]
    fn directory_from_config() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        let directory = config.directory.to_directory().unwrap();
        assert_eq!(directory.resolve_role("principal"), Some(UserId(1)));
        assert_eq!(directory.escalation_target("department_head", 1), Some(UserId(30)));
        assert!(directory.is_admin(UserId(99)));
    }

    #[test]
    fn approver_keys_are_decoded() {
        let key = SigningKey::from_bytes([3; 32]).verifying_key();
        let mut config = DirectoryConfig::default();
        config.keys.push(ApproverKey {
            user: 1,
            public_key: key.to_hex(),
        });
        let directory = config.to_directory().unwrap();
        assert_eq!(directory.verifying_key(UserId(1)), Some(key));

        config.keys[0].public_key = "not-hex".into();
        assert!(matches!(
            config.to_directory().unwrap_err(),
            ConfigError::InvalidKey { user: 1, .. }
        ));
    }

    #[test]
    fn toml_round_trip() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("deadline_hours = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
