use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use custodian_audit::{AuditContext, AuditDraft, AuditRecord, AuditRecorder};
use custodian_crypto::Signature;
use custodian_types::{
    Actor, ApprovalType, AuditId, EntityKind, EventType, Priority, Record, RequestId,
    RequestStatus, RiskLevel, UserId,
};
use tracing::{debug, info, warn};

use crate::directory::ApproverDirectory;
use crate::error::{WorkflowError, WorkflowResult};
use crate::request::{ApprovalComment, ApprovalRequest, DelegationEntry, Transition, TransitionAction};
use crate::step::{AutoApprovalRule, StepResolver, WorkflowConfig, WorkflowStep};

/// The approval state machine.
///
/// ```text
/// pending -> approved | rejected | expired | cancelled     (terminal)
/// pending -> delegated -> pending                          (new assignee, same step)
/// pending -> escalated -> pending                          (higher authority)
/// pending -> pending                                       (multi-level advance)
/// ```
///
/// Every transition writes an audit record under
/// `EntityKind::ApprovalRequest`, parented on the gated change's audit
/// record. Operations take an optional `expected_revision`; when it does
/// not match the stored revision the call fails with
/// [`WorkflowError::StaleApprovalState`] and nothing changes.
pub struct ApprovalWorkflow {
    recorder: Arc<AuditRecorder>,
    directory: Arc<dyn ApproverDirectory>,
    auto_rules: Vec<AutoApprovalRule>,
    inner: RwLock<WorkflowState>,
}

#[derive(Default)]
struct WorkflowState {
    requests: HashMap<RequestId, ApprovalRequest>,
    by_audit: HashMap<AuditId, Vec<RequestId>>,
}

impl ApprovalWorkflow {
    pub fn new(
        recorder: Arc<AuditRecorder>,
        directory: Arc<dyn ApproverDirectory>,
        auto_rules: Vec<AutoApprovalRule>,
    ) -> Self {
        Self {
            recorder,
            directory,
            auto_rules,
            inner: RwLock::new(WorkflowState::default()),
        }
    }

    pub fn directory(&self) -> &Arc<dyn ApproverDirectory> {
        &self.directory
    }

    pub fn auto_rules(&self) -> &[AutoApprovalRule] {
        &self.auto_rules
    }

    /// The first auto-approval rule matching a change, if any.
    pub fn matching_auto_rule(
        &self,
        entity: &EntityKind,
        event: EventType,
        risk: RiskLevel,
        actor_role: &str,
    ) -> Option<&AutoApprovalRule> {
        self.auto_rules
            .iter()
            .find(|rule| rule.matches(entity, event, risk, actor_role))
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Open a request for an audited change: `pending` at step 1, assigned
    /// to step 1's resolver.
    pub fn submit(
        &self,
        audit: &AuditRecord,
        config: &WorkflowConfig,
        requested_by: &Actor,
    ) -> WorkflowResult<ApprovalRequest> {
        let first = config
            .steps
            .first()
            .ok_or_else(|| WorkflowError::EmptyWorkflow(config.name.clone()))?;
        let assignee = self.resolve(first)?;
        let now = self.recorder.clock().now();

        let mut request = self.new_request(audit, config, requested_by, now)?;
        request.assigned_to = Some(assignee);
        request.auto_approval_eligible = self
            .matching_auto_rule(
                &audit.entity_ref.entity_type,
                audit.event_type,
                audit.risk_level,
                &requested_by.role,
            )
            .is_some();

        self.record_transition(
            &mut request,
            requested_by,
            None,
            None,
            TransitionAction::Submit,
            now,
        )?;
        info!(
            request_id = %request.id,
            audit_id = %audit.id,
            entity = %audit.entity_ref,
            workflow = %config.name,
            assigned_to = %assignee,
            "approval requested"
        );
        self.insert(request)
    }

    /// Create a request directly in `approved` for a change that matches an
    /// auto-approval rule. Fails with [`WorkflowError::NotAutoApprovable`]
    /// if no rule matches.
    pub fn auto_approve(
        &self,
        audit: &AuditRecord,
        config: &WorkflowConfig,
        requested_by: &Actor,
    ) -> WorkflowResult<ApprovalRequest> {
        let rule = self
            .matching_auto_rule(
                &audit.entity_ref.entity_type,
                audit.event_type,
                audit.risk_level,
                &requested_by.role,
            )
            .ok_or(WorkflowError::NotAutoApprovable)?
            .name
            .clone();
        let now = self.recorder.clock().now();

        let mut request = self.new_request(audit, config, requested_by, now)?;
        request.status = RequestStatus::Approved;
        request.auto_approval_eligible = true;
        request.auto_approved = true;
        request.approved_by = Some(UserId::SYSTEM);
        request.approved_at = Some(now);
        request.resolved_at = Some(now);

        self.record_transition(
            &mut request,
            &Actor::system(),
            None,
            None,
            TransitionAction::AutoApprove,
            now,
        )?;
        info!(request_id = %request.id, audit_id = %audit.id, rule = %rule, "auto-approved");
        self.insert(request)
    }

    fn new_request(
        &self,
        audit: &AuditRecord,
        config: &WorkflowConfig,
        requested_by: &Actor,
        now: DateTime<Utc>,
    ) -> WorkflowResult<ApprovalRequest> {
        Ok(ApprovalRequest {
            id: RequestId::new(),
            audit_id: audit.id,
            entity_ref: audit.entity_ref.clone(),
            approval_type: ApprovalType::for_event(audit.event_type, audit.risk_level),
            status: RequestStatus::Pending,
            requested_by: requested_by.user_id,
            assigned_to: None,
            approved_by: None,
            priority: Priority::for_risk(audit.risk_level),
            deadline: deadline_after(now, config.deadline_hours)?,
            workflow_name: config.name.clone(),
            workflow_steps: config.steps.clone(),
            current_step: 1,
            deadline_hours: config.deadline_hours,
            escalation_hours: config.escalation_hours,
            delegation_history: Vec::new(),
            escalation_level: 0,
            auto_approval_eligible: false,
            auto_approved: false,
            digital_signature: None,
            comments: Vec::new(),
            transitions: Vec::new(),
            rejection_reason: None,
            approved_at: None,
            resolved_at: None,
            created_at: now,
            revision: 1,
        })
    }

    fn insert(&self, request: ApprovalRequest) -> WorkflowResult<ApprovalRequest> {
        let mut state = self.write()?;
        state
            .by_audit
            .entry(request.audit_id)
            .or_default()
            .push(request.id);
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Approve the current step. Advances to the next step, or resolves the
    /// request as `approved` after the last one.
    pub fn approve(
        &self,
        request_id: RequestId,
        approver: &Actor,
        comments: Option<String>,
        expected_revision: Option<u64>,
        signature: Option<&Signature>,
    ) -> WorkflowResult<ApprovalRequest> {
        self.mutate(request_id, expected_revision, |request, now| {
            self.check_assignee(request, approver, "approve")?;
            let step = current_step(request)?.clone();
            let before = request.summary();

            if let Some(sig) = signature {
                self.verify_signature(request, approver.user_id, sig)?;
                request.digital_signature = Some(sig.to_hex());
            } else if step.require_signature {
                return Err(WorkflowError::SignatureRequired {
                    request_id,
                    step: request.current_step,
                });
            }

            if let Some(text) = comments {
                request.comments.push(ApprovalComment {
                    author: approver.user_id,
                    step: request.current_step,
                    text,
                    at: now,
                });
            }

            if request.is_last_step() {
                request.status = RequestStatus::Approved;
                request.approved_by = Some(approver.user_id);
                request.approved_at = Some(now);
                request.resolved_at = Some(now);
                self.record_transition(
                    request,
                    approver,
                    Some(before),
                    Some(RequestStatus::Pending),
                    TransitionAction::Approve,
                    now,
                )?;
                info!(request_id = %request_id, approver = %approver.user_id, "request approved");
            } else {
                request.current_step += 1;
                let next = current_step(request)?.clone();
                request.assigned_to = Some(self.resolve(&next)?);
                request.deadline = deadline_after(now, request.deadline_hours)?;
                self.record_transition(
                    request,
                    approver,
                    Some(before),
                    Some(RequestStatus::Pending),
                    TransitionAction::Advance,
                    now,
                )?;
                info!(
                    request_id = %request_id,
                    approver = %approver.user_id,
                    step = request.current_step,
                    "approval step advanced"
                );
            }
            Ok(())
        })
    }

    /// Reject at any step. The gated change is discarded by the caller.
    pub fn reject(
        &self,
        request_id: RequestId,
        approver: &Actor,
        reason: &str,
        expected_revision: Option<u64>,
    ) -> WorkflowResult<ApprovalRequest> {
        self.mutate(request_id, expected_revision, |request, now| {
            self.check_assignee(request, approver, "reject")?;
            let before = request.summary();
            request.status = RequestStatus::Rejected;
            request.rejection_reason = Some(reason.to_string());
            request.resolved_at = Some(now);
            self.record_transition(
                request,
                approver,
                Some(before),
                Some(RequestStatus::Pending),
                TransitionAction::Reject,
                now,
            )?;
            info!(request_id = %request_id, approver = %approver.user_id, reason, "request rejected");
            Ok(())
        })
    }

    /// Hand the current step to another user, if the step allows it.
    pub fn delegate(
        &self,
        request_id: RequestId,
        from: &Actor,
        to: UserId,
        reason: &str,
        expected_revision: Option<u64>,
    ) -> WorkflowResult<ApprovalRequest> {
        self.mutate(request_id, expected_revision, |request, now| {
            self.check_assignee(request, from, "delegate")?;
            if !current_step(request)?.can_delegate {
                return Err(WorkflowError::DelegationNotAllowed {
                    request_id,
                    step: request.current_step,
                });
            }

            let before = request.summary();
            request.delegation_history.push(DelegationEntry {
                from: from.user_id,
                to,
                reason: reason.to_string(),
                step: request.current_step,
                at: now,
            });
            request.status = RequestStatus::Delegated;
            self.record_transition(
                request,
                from,
                Some(before),
                Some(RequestStatus::Pending),
                TransitionAction::Delegate,
                now,
            )?;

            let delegated = request.summary();
            request.status = RequestStatus::Pending;
            request.assigned_to = Some(to);
            self.record_transition(
                request,
                from,
                Some(delegated),
                Some(RequestStatus::Delegated),
                TransitionAction::Reassign,
                now,
            )?;
            info!(request_id = %request_id, from = %from.user_id, to = %to, "request delegated");
            Ok(())
        })
    }

    /// Escalate an overdue pending request to the next authority for its
    /// step's role, or expire it when there is none.
    pub fn escalate(&self, request_id: RequestId) -> WorkflowResult<ApprovalRequest> {
        let system = Actor::system();
        self.mutate(request_id, None, |request, now| {
            if !request.is_overdue(now) {
                return Err(WorkflowError::NotOverdue {
                    request_id,
                    deadline: request.deadline,
                });
            }

            let role = current_step(request)?.escalation_role().to_string();
            let level = request.step_escalations().saturating_add(1);
            let before = request.summary();

            match self.directory.escalation_target(&role, level) {
                Some(target) => {
                    let deadline = deadline_after(now, request.escalation_hours)?;
                    request.escalation_level = request.escalation_level.saturating_add(1);
                    request.priority = request.priority.raised();
                    request.status = RequestStatus::Escalated;
                    self.record_transition(
                        request,
                        &system,
                        Some(before),
                        Some(RequestStatus::Pending),
                        TransitionAction::Escalate,
                        now,
                    )?;

                    let escalated = request.summary();
                    request.status = RequestStatus::Pending;
                    request.assigned_to = Some(target);
                    request.deadline = deadline;
                    self.record_transition(
                        request,
                        &system,
                        Some(escalated),
                        Some(RequestStatus::Escalated),
                        TransitionAction::Reassign,
                        now,
                    )?;
                    info!(request_id = %request_id, role = %role, level, assigned_to = %target, "request escalated");
                }
                None => {
                    request.status = RequestStatus::Expired;
                    request.resolved_at = Some(now);
                    self.record_transition(
                        request,
                        &system,
                        Some(before),
                        Some(RequestStatus::Pending),
                        TransitionAction::Expire,
                        now,
                    )?;
                    info!(request_id = %request_id, role = %role, level, "request expired: no higher authority");
                }
            }
            Ok(())
        })
    }

    /// Escalate every overdue pending request. Returns the requests that
    /// changed.
    pub fn sweep_overdue(&self) -> WorkflowResult<Vec<ApprovalRequest>> {
        let now = self.recorder.clock().now();
        let overdue: Vec<RequestId> = self
            .read()?
            .requests
            .values()
            .filter(|r| r.is_overdue(now))
            .map(|r| r.id)
            .collect();

        let mut changed = Vec::with_capacity(overdue.len());
        for id in overdue {
            match self.escalate(id) {
                Ok(request) => changed.push(request),
                // Resolved or escalated by someone else since the scan.
                Err(WorkflowError::StaleApprovalState { .. } | WorkflowError::NotOverdue { .. }) => {}
                Err(err @ WorkflowError::DeadlineOutOfRange { .. }) => {
                    warn!(request_id = %id, error = %err, "escalation skipped");
                }
                Err(err) => return Err(err),
            }
        }
        if !changed.is_empty() {
            debug!(count = changed.len(), "overdue sweep");
        }
        Ok(changed)
    }

    /// Withdraw a pending request. Only the requester or an administrator
    /// may cancel.
    pub fn cancel(
        &self,
        request_id: RequestId,
        by: &Actor,
        expected_revision: Option<u64>,
    ) -> WorkflowResult<ApprovalRequest> {
        self.mutate(request_id, expected_revision, |request, now| {
            if by.user_id != request.requested_by && !self.directory.is_admin(by.user_id) {
                warn!(request_id = %request_id, actor = %by.user_id, "cancel refused");
                return Err(WorkflowError::not_authorized(
                    request_id,
                    by.user_id,
                    "only the requester or an administrator may cancel",
                ));
            }
            let before = request.summary();
            request.status = RequestStatus::Cancelled;
            request.resolved_at = Some(now);
            self.record_transition(
                request,
                by,
                Some(before),
                Some(RequestStatus::Pending),
                TransitionAction::Cancel,
                now,
            )?;
            info!(request_id = %request_id, by = %by.user_id, "request cancelled");
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, request_id: RequestId) -> WorkflowResult<ApprovalRequest> {
        self.read()?
            .requests
            .get(&request_id)
            .cloned()
            .ok_or(WorkflowError::RequestNotFound(request_id))
    }

    pub fn for_audit(&self, audit_id: AuditId) -> WorkflowResult<Vec<ApprovalRequest>> {
        let state = self.read()?;
        Ok(state
            .by_audit
            .get(&audit_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.requests.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Pending requests, oldest first.
    pub fn pending(&self) -> WorkflowResult<Vec<ApprovalRequest>> {
        let mut pending: Vec<ApprovalRequest> = self
            .read()?
            .requests
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.id);
        Ok(pending)
    }

    /// Pending requests currently assigned to `user`.
    pub fn pending_for(&self, user: UserId) -> WorkflowResult<Vec<ApprovalRequest>> {
        Ok(self
            .pending()?
            .into_iter()
            .filter(|r| r.assigned_to == Some(user))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Run `op` against a copy of a pending request and store the result
    /// only if it succeeds. The write lock is held throughout, so two
    /// concurrent actions on one request are serialized and the second
    /// sees the first one's outcome.
    fn mutate(
        &self,
        request_id: RequestId,
        expected_revision: Option<u64>,
        op: impl FnOnce(&mut ApprovalRequest, DateTime<Utc>) -> WorkflowResult<()>,
    ) -> WorkflowResult<ApprovalRequest> {
        let now = self.recorder.clock().now();
        let mut state = self.write()?;
        let stored = state
            .requests
            .get(&request_id)
            .ok_or(WorkflowError::RequestNotFound(request_id))?;

        if let Some(expected) = expected_revision {
            if stored.revision != expected {
                warn!(request_id = %request_id, expected, actual = stored.revision, "stale approval state");
                return Err(WorkflowError::stale(
                    request_id,
                    format!("expected revision {expected}, found {}", stored.revision),
                ));
            }
        }
        if !stored.is_pending() {
            warn!(request_id = %request_id, status = %stored.status, "request no longer pending");
            return Err(WorkflowError::stale(
                request_id,
                format!("request is {}", stored.status),
            ));
        }

        let mut request = stored.clone();
        op(&mut request, now)?;
        request.revision += 1;
        state.requests.insert(request_id, request.clone());
        Ok(request)
    }

    fn check_assignee(
        &self,
        request: &ApprovalRequest,
        actor: &Actor,
        action: &str,
    ) -> WorkflowResult<()> {
        if request.assigned_to == Some(actor.user_id) {
            return Ok(());
        }
        warn!(
            request_id = %request.id,
            actor = %actor.user_id,
            step = request.current_step,
            action,
            "actor is not the assignee"
        );
        Err(WorkflowError::not_authorized(
            request.id,
            actor.user_id,
            format!("not the assignee of step {}", request.current_step),
        ))
    }

    fn verify_signature(
        &self,
        request: &ApprovalRequest,
        approver: UserId,
        signature: &Signature,
    ) -> WorkflowResult<()> {
        let key = self
            .directory
            .verifying_key(approver)
            .ok_or(WorkflowError::InvalidSignature(request.id))?;
        let payload = request.signing_payload(approver)?;
        key.verify(&payload, signature)
            .map_err(|_| WorkflowError::InvalidSignature(request.id))
    }

    fn resolve(&self, step: &WorkflowStep) -> WorkflowResult<UserId> {
        match &step.resolver {
            StepResolver::User(user) => Ok(*user),
            StepResolver::Role(role) => self
                .directory
                .resolve_role(role)
                .ok_or_else(|| WorkflowError::NoApprover(role.clone())),
        }
    }

    /// Audit one state transition and append it to the request's log.
    /// `from = None` marks the transition that created the request.
    fn record_transition(
        &self,
        request: &mut ApprovalRequest,
        actor: &Actor,
        before: Option<Record>,
        from: Option<RequestStatus>,
        action: TransitionAction,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let event = if from.is_none() {
            EventType::Created
        } else {
            EventType::Updated
        };

        let audit = self.recorder.record(
            AuditDraft::new(request.audit_entity(), event, actor.clone())
                .with_states(before, Some(request.summary()))
                .with_parent(Some(request.audit_id))
                .with_context(AuditContext::ApprovalTransition {
                    request_id: request.id,
                    from,
                    to: request.status,
                    action: action.as_str().to_string(),
                    step: request.current_step,
                }),
        )?;
        debug!(request_id = %request.id, audit_id = %audit.id, action = action.as_str(), "transition recorded");

        request.transitions.push(Transition {
            from,
            to: request.status,
            action,
            actor: actor.user_id,
            step: request.current_step,
            at: now,
            audit_id: audit.id,
        });
        Ok(())
    }

    fn read(&self) -> WorkflowResult<RwLockReadGuard<'_, WorkflowState>> {
        self.inner
            .read()
            .map_err(|_| WorkflowError::StoreError("workflow read lock poisoned".into()))
    }

    fn write(&self) -> WorkflowResult<RwLockWriteGuard<'_, WorkflowState>> {
        self.inner
            .write()
            .map_err(|_| WorkflowError::StoreError("workflow write lock poisoned".into()))
    }
}

fn current_step(request: &ApprovalRequest) -> WorkflowResult<&WorkflowStep> {
    request.step().ok_or_else(|| {
        WorkflowError::stale(
            request.id,
            format!("step {} is outside the workflow", request.current_step),
        )
    })
}

fn deadline_after(from: DateTime<Utc>, hours: u32) -> WorkflowResult<DateTime<Utc>> {
    from.checked_add_signed(Duration::hours(i64::from(hours)))
        .ok_or(WorkflowError::DeadlineOutOfRange { from, hours })
}
