use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use custodian_audit::{
    Assessment, AuditContext, AuditDraft, AuditRecord, AuditRecorder, ChangeLogEntry,
    ChangeLogStore, InMemoryAuditStore, InMemoryChangeLog,
};
use custodian_types::{
    Actor, AuditId, BatchId, Clock, EntityRef, EventType, Record, RequestId, RequestStatus,
    SystemClock, UserId,
};
use custodian_versions::{
    DataVersion, InMemoryVersionStore, ValidationReport, VersionReader, VersionWriter,
};
use custodian_workflow::{ApprovalRequest, ApprovalWorkflow, ApproverDirectory, WorkflowConfig};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ChangeControlError, ChangeControlResult};
use crate::events::{ChangeEvent, ChangeEventKind, EventFilter, EventRouter, EventStream};
use crate::hooks::ChangeHook;
use crate::notify::{NotificationIntent, NotificationKind, Outbox};
use crate::proposal::{
    ApprovalDecision, BatchOutcome, ChangeProposal, ProposalOutcome, ProposalStatus, Resolution,
    StagedChange,
};

/// The single entry point domain code calls.
///
/// Composes the audit recorder, version store and approval workflow. A
/// change that needs no approval is audited and committed in one call; a
/// change that does is audited, parked behind an approval request, and
/// staged here until the request resolves.
///
/// The facade never holds its own locks while calling into a component,
/// and components only call down into the audit recorder.
pub struct ChangeControl {
    config: EngineConfig,
    recorder: Arc<AuditRecorder>,
    versions: Arc<InMemoryVersionStore>,
    workflow: Arc<ApprovalWorkflow>,
    changelog: Arc<dyn ChangeLogStore>,
    staged: RwLock<HashMap<RequestId, StagedChange>>,
    hooks: RwLock<Vec<Arc<dyn ChangeHook>>>,
    outbox: Outbox,
    router: EventRouter,
}

impl ChangeControl {
    /// Build an in-memory engine on the system clock.
    pub fn new(config: EngineConfig) -> ChangeControlResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build an in-memory engine with an explicit clock and the directory
    /// described by `config`.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> ChangeControlResult<Self> {
        let directory = Arc::new(config.directory.to_directory()?);
        let recorder = Arc::new(AuditRecorder::new(
            Arc::new(InMemoryAuditStore::new()),
            config.risk_table(),
            Arc::new(config.approval_policy()),
            clock,
        ));
        Ok(Self::from_parts(
            config,
            recorder,
            directory,
            Arc::new(InMemoryChangeLog::new()),
        ))
    }

    /// Assemble an engine from host-supplied parts. The recorder's clock
    /// drives every deadline.
    pub fn from_parts(
        config: EngineConfig,
        recorder: Arc<AuditRecorder>,
        directory: Arc<dyn ApproverDirectory>,
        changelog: Arc<dyn ChangeLogStore>,
    ) -> Self {
        let versions = Arc::new(InMemoryVersionStore::new(recorder.clone()));
        let workflow = Arc::new(ApprovalWorkflow::new(
            recorder.clone(),
            directory,
            config.auto_approval.clone(),
        ));
        let router = EventRouter::new(config.event_capacity);
        Self {
            config,
            recorder,
            versions,
            workflow,
            changelog,
            staged: RwLock::new(HashMap::new()),
            hooks: RwLock::new(Vec::new()),
            outbox: Outbox::default(),
            router,
        }
    }

    // ---- Proposals ----

    /// Audit a mutation and either commit it or park it behind approval.
    pub fn propose(&self, proposal: ChangeProposal) -> ChangeControlResult<ProposalOutcome> {
        self.propose_inner(proposal, None)
    }

    /// Propose several changes as one bulk operation. Every audit record
    /// carries the same batch id; `parent` nests them under a composite
    /// operation's audit record unless a proposal names its own parent.
    ///
    /// Proposals are applied in order and the first failure stops the
    /// batch. Records already written stay written.
    pub fn propose_batch(
        &self,
        proposals: Vec<ChangeProposal>,
        parent: Option<AuditId>,
    ) -> ChangeControlResult<BatchOutcome> {
        let batch_id = BatchId::new();
        let mut outcomes = Vec::with_capacity(proposals.len());
        for mut proposal in proposals {
            if proposal.parent_audit_id.is_none() {
                proposal.parent_audit_id = parent;
            }
            outcomes.push(self.propose_inner(proposal, Some(batch_id))?);
        }
        info!(batch_id = %batch_id, count = outcomes.len(), "batch proposed");
        Ok(BatchOutcome { batch_id, outcomes })
    }

    fn propose_inner(
        &self,
        proposal: ChangeProposal,
        batch_id: Option<BatchId>,
    ) -> ChangeControlResult<ProposalOutcome> {
        let ChangeProposal {
            entity_ref,
            event_type,
            actor,
            old_state,
            new_state,
            workflow,
            parent_audit_id,
        } = proposal;

        self.ensure_writable(&entity_ref)?;
        let assessment = self.recorder.classify(
            &entity_ref,
            event_type,
            old_state.as_ref(),
            new_state.as_ref(),
        )?;

        let change = StagedChange::Mutation {
            entity_ref: entity_ref.clone(),
            event_type,
            new_state: new_state.clone(),
        };
        let draft = AuditDraft::new(entity_ref, event_type, actor)
            .with_states(old_state, new_state)
            .in_batch(batch_id)
            .with_parent(parent_audit_id);
        self.gate(draft, change, &assessment, workflow)
    }

    /// Roll `entity` back to `target`. Appends a new version equal to the
    /// target; later versions are kept. Subject to the same approval policy
    /// as any other change.
    pub fn rollback(
        &self,
        entity: &EntityRef,
        target: u64,
        actor: Actor,
        workflow: Option<WorkflowConfig>,
    ) -> ChangeControlResult<ProposalOutcome> {
        self.ensure_writable(entity)?;
        let target_version = self.versions.get(entity, target)?;
        let current = self.versions.current(entity)?;
        let old = current.as_ref().and_then(|v| v.snapshot().cloned());
        let new = target_version.snapshot().cloned();
        let assessment =
            self.recorder
                .classify(entity, EventType::Rollback, old.as_ref(), new.as_ref())?;

        if !assessment.requires_approval {
            let recorded = self.versions.rollback(entity, target, actor)?;
            self.after_commit(&recorded.version, ChangeEventKind::RolledBack);
            return Ok(ProposalOutcome {
                status: ProposalStatus::Committed {
                    version: Some(recorded.version.version_number),
                },
                audit_id: recorded.audit.id,
                request_id: None,
            });
        }

        let draft = AuditDraft::new(entity.clone(), EventType::Rollback, actor)
            .with_states(old, new)
            .with_context(AuditContext::Rollback {
                target_version: target,
                resulting_version: None,
            });
        let change = StagedChange::Rollback {
            entity_ref: entity.clone(),
            target_version: target,
        };
        self.gate(draft, change, &assessment, workflow)
    }

    /// Merge several versions of `entity` into one new version with the
    /// caller-resolved `merged` snapshot.
    pub fn merge(
        &self,
        entity: &EntityRef,
        sources: &[u64],
        merged: Record,
        actor: Actor,
        workflow: Option<WorkflowConfig>,
    ) -> ChangeControlResult<ProposalOutcome> {
        self.ensure_writable(entity)?;
        for source in sources {
            self.versions.get(entity, *source)?;
        }
        let old = self.versions.current_snapshot(entity)?;
        let assessment =
            self.recorder
                .classify(entity, EventType::Merge, old.as_ref(), Some(&merged))?;

        if !assessment.requires_approval {
            let recorded = self.versions.merge(entity, sources, merged, actor)?;
            self.after_commit(&recorded.version, ChangeEventKind::Merged);
            return Ok(ProposalOutcome {
                status: ProposalStatus::Committed {
                    version: Some(recorded.version.version_number),
                },
                audit_id: recorded.audit.id,
                request_id: None,
            });
        }

        let draft = AuditDraft::new(entity.clone(), EventType::Merge, actor)
            .with_states(old, Some(merged.clone()))
            .with_context(AuditContext::Merge {
                source_versions: sources.to_vec(),
                resulting_version: None,
            });
        let change = StagedChange::Merge {
            entity_ref: entity.clone(),
            source_versions: sources.to_vec(),
            merged,
        };
        self.gate(draft, change, &assessment, workflow)
    }

    /// Record the draft and route the change: commit now, auto-approve and
    /// commit, or submit for approval and stage.
    fn gate(
        &self,
        draft: AuditDraft,
        change: StagedChange,
        assessment: &Assessment,
        workflow: Option<WorkflowConfig>,
    ) -> ChangeControlResult<ProposalOutcome> {
        if !assessment.requires_approval {
            let audit = self.recorder.record(draft)?;
            let version = self.apply(&change, audit.id)?;
            return Ok(ProposalOutcome {
                status: ProposalStatus::Committed {
                    version: version.map(|v| v.version_number),
                },
                audit_id: audit.id,
                request_id: None,
            });
        }

        let config = match workflow {
            Some(config) => config,
            None => self
                .config
                .workflow_for(assessment.approval_type)
                .ok_or(ChangeControlError::NoWorkflow(assessment.approval_type))?,
        };
        let actor = draft.actor.clone();
        let auto = self
            .workflow
            .matching_auto_rule(
                &draft.entity_ref.entity_type,
                draft.event_type,
                assessment.risk_level,
                &actor.role,
            )
            .is_some();

        if auto {
            let audit = self.recorder.record(draft.auto_approved())?;
            let request = self.workflow.auto_approve(&audit, &config, &actor)?;
            let version = self.apply(&change, audit.id)?;
            return Ok(ProposalOutcome {
                status: ProposalStatus::Committed {
                    version: version.map(|v| v.version_number),
                },
                audit_id: audit.id,
                request_id: Some(request.id),
            });
        }

        let audit = self.recorder.record(draft)?;
        let request = self.workflow.submit(&audit, &config, &actor)?;
        self.write_staged()?.insert(request.id, change);

        if let Some(assignee) = request.assigned_to {
            self.notify(assignee, NotificationKind::ApprovalRequested, &request);
        }
        for hook in self.hooks() {
            hook.on_approval_requested(&request);
        }
        self.publish(
            ChangeEvent::new(ChangeEventKind::ApprovalRequested, audit.entity_ref.clone(), self.now())
                .with_audit(audit.id)
                .with_request(request.id, request.status),
        );
        info!(
            entity = %audit.entity_ref,
            audit_id = %audit.id,
            request_id = %request.id,
            risk = %assessment.risk_level,
            "change staged for approval"
        );

        Ok(ProposalOutcome {
            status: ProposalStatus::PendingApproval,
            audit_id: audit.id,
            request_id: Some(request.id),
        })
    }

    // ---- Approvals ----

    /// Apply an approver's decision. A final approval commits the staged
    /// change; a rejection or cancellation discards it.
    pub fn resolve_approval(
        &self,
        request_id: RequestId,
        actor: &Actor,
        decision: ApprovalDecision,
    ) -> ChangeControlResult<Resolution> {
        match decision {
            ApprovalDecision::Approve {
                comments,
                signature,
                expected_revision,
            } => {
                if !self.read_staged()?.contains_key(&request_id) {
                    return Err(ChangeControlError::StagedChangeMissing(request_id));
                }
                let request = self.workflow.approve(
                    request_id,
                    actor,
                    comments,
                    expected_revision,
                    signature.as_ref(),
                )?;
                if request.status != RequestStatus::Approved {
                    self.after_reassignment(&request);
                    return Ok(Resolution {
                        request,
                        committed: None,
                    });
                }
                self.after_resolution(&request, NotificationKind::Approved);
                let committed = self.commit_staged(&request)?;
                Ok(Resolution { request, committed })
            }
            ApprovalDecision::Reject {
                reason,
                expected_revision,
            } => {
                let request = self
                    .workflow
                    .reject(request_id, actor, &reason, expected_revision)?;
                self.discard_staged(request_id)?;
                self.after_resolution(&request, NotificationKind::Rejected);
                Ok(Resolution {
                    request,
                    committed: None,
                })
            }
            ApprovalDecision::Delegate {
                to,
                reason,
                expected_revision,
            } => {
                let request =
                    self.workflow
                        .delegate(request_id, actor, to, &reason, expected_revision)?;
                self.notify(to, NotificationKind::Delegated, &request);
                self.publish(self.request_event(ChangeEventKind::ApprovalReassigned, &request));
                Ok(Resolution {
                    request,
                    committed: None,
                })
            }
            ApprovalDecision::Cancel { expected_revision } => {
                let request = self.workflow.cancel(request_id, actor, expected_revision)?;
                self.discard_staged(request_id)?;
                self.after_resolution(&request, NotificationKind::Cancelled);
                Ok(Resolution {
                    request,
                    committed: None,
                })
            }
        }
    }

    /// Commit the staged change of an already approved request. Used to
    /// retry after a commit failed, e.g. once a quarantined entity has been
    /// released.
    pub fn commit_approved(&self, request_id: RequestId) -> ChangeControlResult<Option<DataVersion>> {
        let request = self.workflow.get(request_id)?;
        if request.status != RequestStatus::Approved {
            return Err(ChangeControlError::NotApproved {
                request_id,
                status: request.status,
            });
        }
        self.commit_staged(&request)
    }

    /// Escalate one overdue request, or expire it when nobody is left to
    /// escalate to. An expired request's staged change is discarded.
    pub fn escalate(&self, request_id: RequestId) -> ChangeControlResult<ApprovalRequest> {
        let request = self.workflow.escalate(request_id)?;
        self.after_escalation(&request)?;
        Ok(request)
    }

    /// Escalate every overdue pending request. This is the periodic job;
    /// see [`EscalationSweeper`](crate::EscalationSweeper).
    pub fn sweep_overdue(&self) -> ChangeControlResult<Vec<ApprovalRequest>> {
        let changed = self.workflow.sweep_overdue()?;
        for request in &changed {
            self.after_escalation(request)?;
        }
        Ok(changed)
    }

    fn commit_staged(&self, request: &ApprovalRequest) -> ChangeControlResult<Option<DataVersion>> {
        // Taken out before applying so a racing commit finds nothing to apply.
        let change = self
            .write_staged()?
            .remove(&request.id)
            .ok_or(ChangeControlError::StagedChangeMissing(request.id))?;
        match self.apply(&change, request.audit_id) {
            Ok(version) => Ok(version),
            Err(err) => {
                self.write_staged()?.insert(request.id, change);
                Err(err)
            }
        }
    }

    fn discard_staged(&self, request_id: RequestId) -> ChangeControlResult<()> {
        if self.write_staged()?.remove(&request_id).is_some() {
            debug!(request_id = %request_id, "staged change discarded");
        }
        Ok(())
    }

    /// Write the version for an approved or approval-free change.
    fn apply(&self, change: &StagedChange, audit_id: AuditId) -> ChangeControlResult<Option<DataVersion>> {
        let (version, kind) = match change {
            StagedChange::Mutation {
                entity_ref,
                event_type,
                new_state,
            } => {
                if !event_type.implies_mutation() {
                    return Ok(None);
                }
                let version = if event_type.is_deletion() {
                    self.versions.commit_tombstone(entity_ref, audit_id)?
                } else {
                    match new_state {
                        Some(state) => self.versions.commit(entity_ref, audit_id, state.clone())?,
                        None => return Ok(None),
                    }
                };
                (version, ChangeEventKind::Committed)
            }
            StagedChange::Rollback {
                entity_ref,
                target_version,
            } => (
                self.versions
                    .apply_rollback(entity_ref, *target_version, audit_id)?,
                ChangeEventKind::RolledBack,
            ),
            StagedChange::Merge {
                entity_ref,
                source_versions,
                merged,
            } => (
                self.versions
                    .apply_merge(entity_ref, source_versions, merged.clone(), audit_id)?,
                ChangeEventKind::Merged,
            ),
        };
        self.after_commit(&version, kind);
        Ok(Some(version))
    }

    fn ensure_writable(&self, entity: &EntityRef) -> ChangeControlResult<()> {
        if self.versions.is_quarantined(entity)? {
            warn!(entity = %entity, "write refused: entity quarantined");
            return Err(ChangeControlError::EntityQuarantined(entity.clone()));
        }
        Ok(())
    }

    // ---- Side effects ----

    fn after_commit(&self, version: &DataVersion, kind: ChangeEventKind) {
        for hook in self.hooks() {
            match kind {
                ChangeEventKind::RolledBack => hook.on_rollback(version),
                _ => hook.on_committed(version),
            }
        }
        self.publish(
            ChangeEvent::new(kind, version.entity_ref.clone(), version.created_at)
                .with_audit(version.audit_id)
                .with_version(version.version_number),
        );
    }

    fn after_reassignment(&self, request: &ApprovalRequest) {
        if let Some(assignee) = request.assigned_to {
            self.notify(assignee, NotificationKind::ApprovalRequested, request);
        }
        self.publish(self.request_event(ChangeEventKind::ApprovalReassigned, request));
    }

    fn after_resolution(&self, request: &ApprovalRequest, kind: NotificationKind) {
        self.notify(request.requested_by, kind, request);
        for hook in self.hooks() {
            hook.on_approval_resolved(request);
        }
        self.publish(self.request_event(ChangeEventKind::ApprovalResolved, request));
    }

    fn after_escalation(&self, request: &ApprovalRequest) -> ChangeControlResult<()> {
        if request.status == RequestStatus::Expired {
            self.discard_staged(request.id)?;
            self.after_resolution(request, NotificationKind::Expired);
            return Ok(());
        }
        if let Some(assignee) = request.assigned_to {
            self.notify(assignee, NotificationKind::Escalated, request);
        }
        for hook in self.hooks() {
            hook.on_escalated(request);
        }
        self.publish(self.request_event(ChangeEventKind::Escalated, request));
        Ok(())
    }

    fn notify(&self, recipient: UserId, kind: NotificationKind, request: &ApprovalRequest) {
        self.outbox.push(NotificationIntent::new(
            recipient,
            kind,
            request.id,
            request.entity_ref.clone(),
            self.now(),
        ));
    }

    fn request_event(&self, kind: ChangeEventKind, request: &ApprovalRequest) -> ChangeEvent {
        ChangeEvent::new(kind, request.entity_ref.clone(), self.now())
            .with_audit(request.audit_id)
            .with_request(request.id, request.status)
    }

    fn publish(&self, event: ChangeEvent) {
        self.router.route(&event);
    }

    fn hooks(&self) -> Vec<Arc<dyn ChangeHook>> {
        self.hooks.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn now(&self) -> DateTime<Utc> {
        self.recorder.clock().now()
    }

    // ---- Change log ----

    /// Record a lightweight change-log entry for a record that is not under
    /// full version control.
    pub fn log_change(
        &self,
        entity: EntityRef,
        actor: Actor,
        summary: &str,
        old: Option<&Record>,
        new: Option<&Record>,
        audit_id: Option<AuditId>,
    ) -> ChangeControlResult<ChangeLogEntry> {
        let changes = custodian_diff::diff(old, new)?;
        let entry =
            ChangeLogEntry::new(entity, actor, summary, changes, self.now()).with_audit(audit_id);
        self.changelog.append(entry.clone())?;
        debug!(entity = %entry.entity_ref, entry_id = %entry.id, "change logged");
        Ok(entry)
    }

    /// Record a change to a free-text body with a line diff.
    pub fn log_text_change(
        &self,
        entity: EntityRef,
        actor: Actor,
        summary: &str,
        old_text: &str,
        new_text: &str,
    ) -> ChangeControlResult<ChangeLogEntry> {
        let entry = ChangeLogEntry::new(entity, actor, summary, Default::default(), self.now())
            .with_text(old_text, new_text);
        self.changelog.append(entry.clone())?;
        debug!(entity = %entry.entity_ref, entry_id = %entry.id, "text change logged");
        Ok(entry)
    }

    pub fn change_log(&self, entity: &EntityRef) -> ChangeControlResult<Vec<ChangeLogEntry>> {
        Ok(self.changelog.for_entity(entity)?)
    }

    // ---- Maintenance ----

    /// Soft-delete audit records older than `cutoff`.
    pub fn apply_retention(
        &self,
        cutoff: DateTime<Utc>,
        actor: Actor,
    ) -> ChangeControlResult<Vec<AuditRecord>> {
        Ok(self.recorder.apply_retention(cutoff, actor)?)
    }

    /// Re-open a quarantined entity after manual reconciliation.
    pub fn release_quarantine(&self, entity: &EntityRef, actor: &Actor) -> ChangeControlResult<bool> {
        let released = self.versions.release_quarantine(entity)?;
        if released {
            warn!(entity = %entity, by = %actor.user_id, "quarantine released");
        }
        Ok(released)
    }

    // ---- Subscriptions ----

    pub fn add_hook(&self, hook: Arc<dyn ChangeHook>) {
        self.hooks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(hook);
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        self.router.subscribe(filter)
    }

    pub fn subscriber_count(&self) -> usize {
        self.router.subscriber_count()
    }

    pub fn pending_notifications(&self) -> Vec<NotificationIntent> {
        self.outbox.pending()
    }

    /// Take every undelivered notification intent.
    pub fn drain_notifications(&self) -> Vec<NotificationIntent> {
        self.outbox.drain()
    }

    // ---- Reads ----

    pub fn current(&self, entity: &EntityRef) -> ChangeControlResult<Option<DataVersion>> {
        Ok(self.versions.current(entity)?)
    }

    pub fn version(&self, entity: &EntityRef, number: u64) -> ChangeControlResult<DataVersion> {
        Ok(self.versions.get(entity, number)?)
    }

    pub fn history(&self, entity: &EntityRef) -> ChangeControlResult<Vec<DataVersion>> {
        Ok(self.versions.history(entity)?)
    }

    pub fn validate(&self, entity: &EntityRef) -> ChangeControlResult<ValidationReport> {
        Ok(self.versions.validate_chain(entity)?)
    }

    pub fn audit(&self, id: AuditId) -> ChangeControlResult<AuditRecord> {
        Ok(self.recorder.get(id)?)
    }

    pub fn audit_trail(&self, entity: &EntityRef) -> ChangeControlResult<Vec<AuditRecord>> {
        Ok(self.recorder.history(entity)?)
    }

    /// Audit records written by one [`propose_batch`](Self::propose_batch)
    /// call.
    pub fn batch_audits(&self, batch_id: BatchId) -> ChangeControlResult<Vec<AuditRecord>> {
        Ok(self.recorder.store().by_batch(batch_id)?)
    }

    /// Ids of audit records for `entity` whose checksum no longer matches.
    pub fn tampered_audits(&self, entity: &EntityRef) -> ChangeControlResult<Vec<AuditId>> {
        Ok(self.recorder.verify_entity(entity)?)
    }

    pub fn request(&self, id: RequestId) -> ChangeControlResult<ApprovalRequest> {
        Ok(self.workflow.get(id)?)
    }

    pub fn requests_for_audit(&self, audit_id: AuditId) -> ChangeControlResult<Vec<ApprovalRequest>> {
        Ok(self.workflow.for_audit(audit_id)?)
    }

    pub fn pending_approvals(&self) -> ChangeControlResult<Vec<ApprovalRequest>> {
        Ok(self.workflow.pending()?)
    }

    pub fn approvals_for(&self, user: UserId) -> ChangeControlResult<Vec<ApprovalRequest>> {
        Ok(self.workflow.pending_for(user)?)
    }

    pub fn staged_change(&self, request_id: RequestId) -> ChangeControlResult<Option<StagedChange>> {
        Ok(self.read_staged()?.get(&request_id).cloned())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn recorder(&self) -> &Arc<AuditRecorder> {
        &self.recorder
    }

    pub fn versions(&self) -> &Arc<InMemoryVersionStore> {
        &self.versions
    }

    pub fn workflow(&self) -> &Arc<ApprovalWorkflow> {
        &self.workflow
    }

    fn read_staged(&self) -> ChangeControlResult<RwLockReadGuard<'_, HashMap<RequestId, StagedChange>>> {
        self.staged
            .read()
            .map_err(|_| ChangeControlError::StoreError("staged read lock poisoned".into()))
    }

    fn write_staged(
        &self,
    ) -> ChangeControlResult<RwLockWriteGuard<'_, HashMap<RequestId, StagedChange>>> {
        self.staged
            .write()
            .map_err(|_| ChangeControlError::StoreError("staged write lock poisoned".into()))
    }
}
