#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use custodian_core::{
    Actor, ChangeControl, ChangeProposal, EngineConfig, EntityKind, EntityRef, EventType,
    ManualClock, PolicyRule, Record, RiskLevel, RiskRule, UserId, WorkflowStep,
    DEFAULT_WORKFLOW,
};

pub const PRINCIPAL: UserId = UserId(1);
pub const TEACHER: UserId = UserId(12);
pub const HEAD: UserId = UserId(20);
pub const DEPUTY: UserId = UserId(21);
pub const TRUSTEE: UserId = UserId(30);
pub const ADMIN: UserId = UserId(99);

/// Grade updates on exam results are critical and go through the
/// department head then the principal. Grade restorations, deletions and
/// exam-result merges go through the principal alone.
pub fn school_config() -> EngineConfig {
    let mut config = EngineConfig::default()
        .with_workflow(
            "critical_update",
            vec![
                WorkflowStep::role("department_head").delegable(),
                WorkflowStep::role("principal"),
            ],
        )
        .with_workflow(DEFAULT_WORKFLOW, vec![WorkflowStep::role("principal")]);
    config.risk_rules.push(
        RiskRule::new("posted grades", RiskLevel::Critical)
            .for_entity(EntityKind::ExamResult)
            .for_event(EventType::Updated)
            .for_event(EventType::Rollback)
            .on_field("grade"),
    );
    config
        .approval_rules
        .push(PolicyRule::new("critical").at_or_above(RiskLevel::Critical));
    config
        .approval_rules
        .push(PolicyRule::new("deletions").for_event(EventType::Deleted));
    config.approval_rules.push(
        PolicyRule::new("result merges")
            .for_entity(EntityKind::ExamResult)
            .for_event(EventType::Merge),
    );
    config.directory.roles.insert("department_head".into(), HEAD.0);
    config.directory.roles.insert("principal".into(), PRINCIPAL.0);
    config
        .directory
        .escalation
        .insert("department_head".into(), vec![TRUSTEE.0]);
    config.directory.admins.push(ADMIN.0);
    config.deadline_hours = 48;
    config.escalation_hours = 24;
    config
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap(),
    ))
}

pub fn engine_with(config: EngineConfig) -> (ChangeControl, Arc<ManualClock>) {
    let clock = clock();
    let engine = ChangeControl::with_clock(config, clock.clone()).unwrap();
    (engine, clock)
}

pub fn school() -> (ChangeControl, Arc<ManualClock>) {
    engine_with(school_config())
}

pub fn permissive() -> ChangeControl {
    engine_with(EngineConfig::default()).0
}

pub fn result(id: i64) -> EntityRef {
    EntityRef::new(EntityKind::ExamResult, id)
}

pub fn graded(grade: &str) -> Record {
    Record::new()
        .with("grade", grade)
        .with("score", 71i64)
        .with("remarks", "on time")
}

pub fn teacher() -> Actor {
    Actor::new(TEACHER, "teacher")
}

pub fn head() -> Actor {
    Actor::new(HEAD, "department_head")
}

pub fn principal() -> Actor {
    Actor::new(PRINCIPAL, "principal")
}

/// Create `result(id)` and update its remarks until it has `n` versions.
pub fn with_versions(engine: &ChangeControl, id: i64, n: i64) {
    engine
        .propose(ChangeProposal::create(result(id), teacher(), graded("B")))
        .unwrap();
    for i in 2..=n {
        let old = engine.current(&result(id)).unwrap().unwrap().data_snapshot;
        let new = old.clone().with("remarks", format!("revision {i}"));
        let outcome = engine
            .propose(ChangeProposal::update(result(id), teacher(), old, new))
            .unwrap();
        assert!(outcome.is_committed());
    }
}
