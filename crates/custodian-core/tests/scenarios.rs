mod common;

use common::*;
use custodian_core::{
    ApprovalDecision, AuditContext, ChangeControlError, ChangeProposal, EntityKind, EntityRef,
    EventType, FieldValue, ProposalStatus, Record, RequestStatus, SigningKey, StagedChange,
    WorkflowConfig, WorkflowStep,
};

// ---- A. Low-risk change commits immediately ----

#[test]
fn low_risk_update_commits_without_request() {
    let (engine, _) = school();
    with_versions(&engine, 1, 1);

    let old = graded("B");
    let new = old.clone().with("remarks", "late submission");
    let outcome = engine
        .propose(ChangeProposal::update(result(1), teacher(), old, new.clone()))
        .unwrap();

    assert_eq!(outcome.status, ProposalStatus::Committed { version: Some(2) });
    assert!(outcome.request_id.is_none());
    assert_eq!(engine.current(&result(1)).unwrap().unwrap().data_snapshot, new);
    assert!(engine.requests_for_audit(outcome.audit_id).unwrap().is_empty());
    assert!(engine.pending_approvals().unwrap().is_empty());

    let audit = engine.audit(outcome.audit_id).unwrap();
    assert_eq!(audit.changed_fields.len(), 1);
    assert!(audit.changed_fields.contains("remarks"));
    assert!(!audit.requires_approval);
}

// ---- B. Critical update walks a two-step workflow ----

#[test]
fn critical_update_needs_both_approvals() {
    let (engine, _) = school();
    with_versions(&engine, 1, 1);
    let prior = engine.current(&result(1)).unwrap().unwrap();

    let outcome = engine
        .propose(ChangeProposal::update(
            result(1),
            teacher(),
            graded("B"),
            graded("A"),
        ))
        .unwrap();
    assert_eq!(outcome.status, ProposalStatus::PendingApproval);
    let request_id = outcome.request_id.unwrap();
    let request = engine.request(request_id).unwrap();
    assert_eq!(request.current_step, 1);
    assert_eq!(request.assigned_to, Some(HEAD));

    let step_one = engine
        .resolve_approval(request_id, &head(), ApprovalDecision::approve())
        .unwrap();
    assert_eq!(step_one.request.status, RequestStatus::Pending);
    assert_eq!(step_one.request.current_step, 2);
    assert!(step_one.committed.is_none());
    assert_eq!(engine.history(&result(1)).unwrap().len(), 1);

    let step_two = engine
        .resolve_approval(
            request_id,
            &principal(),
            ApprovalDecision::approve().with_comments("checked the script"),
        )
        .unwrap();
    assert_eq!(step_two.request.status, RequestStatus::Approved);
    assert_eq!(step_two.request.approved_by, Some(PRINCIPAL));

    let committed = step_two.committed.unwrap();
    assert_eq!(committed.version_number, 2);
    assert_eq!(committed.parent_version_id, Some(prior.id));
    assert_eq!(committed.data_snapshot, graded("A"));
    assert_eq!(committed.audit_id, outcome.audit_id);
    assert!(engine.validate(&result(1)).unwrap().is_valid());
}

#[test]
fn approval_transitions_are_audited_under_the_request() {
    let (engine, _) = school();
    with_versions(&engine, 1, 1);
    let outcome = engine
        .propose(ChangeProposal::update(result(1), teacher(), graded("B"), graded("A")))
        .unwrap();
    let request_id = outcome.request_id.unwrap();
    engine
        .resolve_approval(request_id, &head(), ApprovalDecision::approve())
        .unwrap();

    let request = engine.request(request_id).unwrap();
    let trail = engine.audit_trail(&request.audit_entity()).unwrap();
    assert_eq!(trail.len(), 2);
    assert!(trail
        .iter()
        .all(|a| a.parent_audit_id == Some(outcome.audit_id)));
    assert!(matches!(
        trail[1].context,
        Some(AuditContext::ApprovalTransition { .. })
    ));

    // The gated change's own record is never rewritten.
    let original = engine.audit(outcome.audit_id).unwrap();
    assert!(engine.recorder().verify(&original).is_ok());
}

// ---- C. Rejection at step 1 ----

#[test]
fn rejection_leaves_current_version_unchanged() {
    let (engine, _) = school();
    with_versions(&engine, 1, 1);
    let before = engine.current(&result(1)).unwrap().unwrap();

    let request_id = engine
        .propose(ChangeProposal::update(result(1), teacher(), graded("B"), graded("A")))
        .unwrap()
        .request_id
        .unwrap();
    let resolution = engine
        .resolve_approval(
            request_id,
            &head(),
            ApprovalDecision::reject("exam board has signed off"),
        )
        .unwrap();

    assert_eq!(resolution.request.status, RequestStatus::Rejected);
    assert_eq!(
        resolution.request.rejection_reason.as_deref(),
        Some("exam board has signed off")
    );
    assert_eq!(engine.history(&result(1)).unwrap().len(), 1);
    assert_eq!(engine.current(&result(1)).unwrap().unwrap(), before);

    let err = engine
        .resolve_approval(request_id, &principal(), ApprovalDecision::approve())
        .unwrap_err();
    assert!(matches!(
        err,
        ChangeControlError::StagedChangeMissing(_) | ChangeControlError::StaleApprovalState { .. }
    ));
}

// ---- D. Escalation with no higher authority expires ----

#[test]
fn overdue_request_without_authority_expires() {
    let (engine, clock) = school();
    let student = EntityRef::new(EntityKind::Student, 7);
    let outcome = engine
        .propose(ChangeProposal::create(student.clone(), teacher(), Record::new().with("name", "Ada")))
        .unwrap();
    assert!(outcome.is_committed());

    let request_id = engine
        .propose(ChangeProposal::delete(student.clone(), teacher(), Record::new().with("name", "Ada")))
        .unwrap()
        .request_id
        .unwrap();

    assert!(engine.escalate(request_id).is_err());

    clock.advance(chrono::Duration::hours(49));
    let request = engine.escalate(request_id).unwrap();
    assert_eq!(request.status, RequestStatus::Expired);
    assert!(engine.staged_change(request_id).unwrap().is_none());

    let current = engine.current(&student).unwrap().unwrap();
    assert_eq!(current.version_number, 1);
    assert!(!current.tombstone);
}

#[test]
fn overdue_request_escalates_along_the_chain() {
    let (engine, clock) = school();
    with_versions(&engine, 1, 1);
    let request_id = engine
        .propose(ChangeProposal::update(result(1), teacher(), graded("B"), graded("A")))
        .unwrap()
        .request_id
        .unwrap();
    engine.drain_notifications();

    clock.advance(chrono::Duration::hours(49));
    let swept = engine.sweep_overdue().unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].assigned_to, Some(TRUSTEE));
    assert_eq!(swept[0].escalation_level, 1);
    assert_eq!(engine.approvals_for(TRUSTEE).unwrap().len(), 1);

    let notes = engine.drain_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].recipient, TRUSTEE);

    clock.advance(chrono::Duration::hours(25));
    let swept = engine.sweep_overdue().unwrap();
    assert_eq!(swept[0].status, RequestStatus::Expired);
    assert!(engine.pending_approvals().unwrap().is_empty());
    assert_eq!(engine.history(&result(1)).unwrap().len(), 1);
}

#[test]
fn unrepresentable_deadline_fails_the_proposal_cleanly() {
    let mut config = school_config();
    config.deadline_hours = u32::MAX;
    let (engine, _) = engine_with(config);
    with_versions(&engine, 1, 1);

    let err = engine
        .propose(ChangeProposal::update(result(1), teacher(), graded("B"), graded("A")))
        .unwrap_err();
    assert!(matches!(err, ChangeControlError::Workflow(_)));
    assert!(engine.pending_approvals().unwrap().is_empty());
    assert_eq!(engine.history(&result(1)).unwrap().len(), 1);
}

// ---- E. Rollback appends a copy of the target ----

#[test]
fn rollback_to_version_two_produces_version_six() {
    let (engine, _) = school();
    with_versions(&engine, 1, 5);
    let target = engine.version(&result(1), 2).unwrap();

    let outcome = engine.rollback(&result(1), 2, principal(), None).unwrap();
    assert_eq!(outcome.version(), Some(6));

    let current = engine.current(&result(1)).unwrap().unwrap();
    assert_eq!(current.version_number, 6);
    assert_eq!(current.data_snapshot, target.data_snapshot);
    assert_eq!(current.rolled_back_from, Some(2));
    assert_eq!(engine.history(&result(1)).unwrap().len(), 6);

    let audit = engine.audit(outcome.audit_id).unwrap();
    assert_eq!(audit.event_type, EventType::Rollback);
    assert_eq!(
        audit.context,
        Some(AuditContext::Rollback {
            target_version: 2,
            resulting_version: Some(6),
        })
    );
}

#[test]
fn rollback_across_a_field_kind_change_round_trips() {
    let engine = permissive();
    let entity = result(3);
    let scored = Record::new().with("score", 81i64);
    let cleared = Record::new().with("score", FieldValue::Null);
    let lettered = Record::new().with("score", "A");
    engine
        .propose(ChangeProposal::create(entity.clone(), teacher(), scored.clone()))
        .unwrap();
    engine
        .propose(ChangeProposal::update(
            entity.clone(),
            teacher(),
            scored.clone(),
            cleared.clone(),
        ))
        .unwrap();
    engine
        .propose(ChangeProposal::update(entity.clone(), teacher(), cleared, lettered))
        .unwrap();

    let outcome = engine.rollback(&entity, 1, principal(), None).unwrap();
    assert_eq!(outcome.version(), Some(4));
    assert_eq!(
        engine.current(&entity).unwrap().unwrap().data_snapshot,
        scored
    );
    let audit = engine.audit(outcome.audit_id).unwrap();
    assert!(audit.changed_fields.contains("score"));
}

#[test]
fn rollback_to_missing_version_fails() {
    let (engine, _) = school();
    with_versions(&engine, 1, 2);
    assert_eq!(
        engine.rollback(&result(1), 9, principal(), None),
        Err(ChangeControlError::VersionNotFound {
            entity: result(1),
            version: 9,
        })
    );
}

#[test]
fn gated_rollback_commits_after_approval() {
    let (engine, _) = school();
    with_versions(&engine, 1, 1);
    let regrade = engine
        .propose(ChangeProposal::update(result(1), teacher(), graded("B"), graded("A")))
        .unwrap()
        .request_id
        .unwrap();
    engine
        .resolve_approval(regrade, &head(), ApprovalDecision::approve())
        .unwrap();
    engine
        .resolve_approval(regrade, &principal(), ApprovalDecision::approve())
        .unwrap();

    // Restoring the old grade needs the principal.
    let outcome = engine.rollback(&result(1), 1, teacher(), None).unwrap();
    assert!(outcome.is_pending());
    let request_id = outcome.request_id.unwrap();
    assert_eq!(
        engine.staged_change(request_id).unwrap(),
        Some(StagedChange::Rollback {
            entity_ref: result(1),
            target_version: 1,
        })
    );

    let resolution = engine
        .resolve_approval(request_id, &principal(), ApprovalDecision::approve())
        .unwrap();
    let version = resolution.committed.unwrap();
    assert_eq!(version.version_number, 3);
    assert_eq!(version.data_snapshot, graded("B"));
    assert_eq!(version.audit_id, outcome.audit_id);
    assert_eq!(
        engine.audit(outcome.audit_id).unwrap().context,
        Some(AuditContext::Rollback {
            target_version: 1,
            resulting_version: None,
        })
    );
}

// ---- Merge ----

#[test]
fn gated_merge_commits_after_approval() {
    let (engine, _) = school();
    with_versions(&engine, 1, 3);
    let merged = graded("B").with("remarks", "combined");

    let outcome = engine
        .merge(&result(1), &[2, 3], merged.clone(), teacher(), None)
        .unwrap();
    assert!(outcome.is_pending());

    let resolution = engine
        .resolve_approval(outcome.request_id.unwrap(), &principal(), ApprovalDecision::approve())
        .unwrap();
    let version = resolution.committed.unwrap();
    assert_eq!(version.version_number, 4);
    assert_eq!(version.merge_source_versions, vec![2, 3]);
    assert_eq!(version.data_snapshot, merged);
}

// ---- Delegation, cancellation, signatures ----

#[test]
fn delegated_step_is_approved_by_delegate() {
    let (engine, _) = school();
    with_versions(&engine, 1, 1);
    let request_id = engine
        .propose(ChangeProposal::update(result(1), teacher(), graded("B"), graded("A")))
        .unwrap()
        .request_id
        .unwrap();

    let delegated = engine
        .resolve_approval(
            request_id,
            &head(),
            ApprovalDecision::delegate(DEPUTY, "on leave"),
        )
        .unwrap();
    assert_eq!(delegated.request.assigned_to, Some(DEPUTY));
    assert_eq!(delegated.request.delegation_history.len(), 1);

    assert!(matches!(
        engine.resolve_approval(request_id, &head(), ApprovalDecision::approve()),
        Err(ChangeControlError::NotAuthorized { .. })
    ));
    let advanced = engine
        .resolve_approval(
            request_id,
            &custodian_core::Actor::new(DEPUTY, "deputy_head"),
            ApprovalDecision::approve(),
        )
        .unwrap();
    assert_eq!(advanced.request.assigned_to, Some(PRINCIPAL));
}

#[test]
fn requester_can_cancel_pending_change() {
    let (engine, _) = school();
    with_versions(&engine, 1, 1);
    let request_id = engine
        .propose(ChangeProposal::update(result(1), teacher(), graded("B"), graded("A")))
        .unwrap()
        .request_id
        .unwrap();

    assert!(matches!(
        engine.resolve_approval(request_id, &head(), ApprovalDecision::cancel()),
        Err(ChangeControlError::NotAuthorized { .. })
    ));
    let resolution = engine
        .resolve_approval(request_id, &teacher(), ApprovalDecision::cancel())
        .unwrap();
    assert_eq!(resolution.request.status, RequestStatus::Cancelled);
    assert!(engine.staged_change(request_id).unwrap().is_none());
}

#[test]
fn signed_step_verifies_approver_key() {
    let key = SigningKey::from_bytes([7; 32]);
    let mut config = school_config();
    config.directory.keys.push(custodian_core::ApproverKey {
        user: PRINCIPAL.0,
        public_key: key.verifying_key().to_hex(),
    });
    let (engine, _) = engine_with(config);
    with_versions(&engine, 1, 1);

    let workflow = WorkflowConfig::new("signed", vec![WorkflowStep::role("principal").signed()]);
    let request_id = engine
        .propose(
            ChangeProposal::update(result(1), teacher(), graded("B"), graded("A"))
                .with_workflow(workflow),
        )
        .unwrap()
        .request_id
        .unwrap();

    assert!(engine
        .resolve_approval(request_id, &principal(), ApprovalDecision::approve())
        .is_err());

    let request = engine.request(request_id).unwrap();
    let payload = request.signing_payload(PRINCIPAL).unwrap();
    let signature = key.sign(&payload);
    let resolution = engine
        .resolve_approval(
            request_id,
            &principal(),
            ApprovalDecision::approve()
                .with_signature(signature.clone())
                .at_revision(request.revision),
        )
        .unwrap();
    assert_eq!(
        resolution.request.digital_signature,
        Some(signature.to_hex())
    );
    assert!(resolution.committed.is_some());
}
