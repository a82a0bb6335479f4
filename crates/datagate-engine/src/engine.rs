//! Execution engine
//!
//! Orchestrates the lifecycle of flow executions: creation, decision
//! recording, and cancellation. All state writes for one decision happen in
//! a single storage transaction; the engine computes the transition with
//! the pure state machine, hands the effects to storage with the state it
//! computed against, and re-reads on a concurrency conflict — contending
//! actors wait on the execution lock and re-read after acquisition.

use crate::authority::{AuthorityContext, AuthorityResolver};
use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, EngineResult};
use crate::events::EventSink;
use crate::state_machine::plan_transition;
use datagate_storage::{
    DataGateStore, ExecutionAdvance, ExecutionFilter, NewApproval, NewExecution, NewNotification,
    NodeStatusUpdate, QueryWindow, StorageError,
};
use datagate_types::{
    Approval, ApprovalEvent, ApprovalEventEnvelope, ApprovalFlow, ApprovalNode, ApproverType,
    Decision, ExecutionId, ExecutionStatus, FlowExecution, FlowId, IssueId, NodeExecution,
    NodeExecutionStatus, NotificationKind, SensitivityLevel, UserId,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts at applying one decision before giving up on contention.
/// Each retry re-reads the execution under fresh state, so more than one
/// loop is already rare.
const MAX_DECISION_ATTEMPTS: usize = 3;

/// Result of a recorded decision: the new node and flow states.
#[derive(Debug, Clone)]
pub struct RecordedDecision {
    pub approval: Approval,
    pub node_status: NodeExecutionStatus,
    pub flow_status: ExecutionStatus,
    pub execution: FlowExecution,
}

/// The approval flow execution engine.
pub struct ExecutionEngine<S, A, E> {
    store: Arc<S>,
    authority: A,
    events: E,
    clock: Arc<dyn Clock>,
}

impl<S, A, E> ExecutionEngine<S, A, E>
where
    S: DataGateStore,
    A: AuthorityResolver,
    E: EventSink,
{
    pub fn new(store: Arc<S>, authority: A, events: E) -> Self {
        Self {
            store,
            authority,
            events,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(store: Arc<S>, authority: A, events: E, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            authority,
            events,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Start an execution of `flow_id` for `issue_id`.
    ///
    /// The execution is created in progress with the lowest-position node
    /// active. Fails with [`EngineError::FlowDisabled`],
    /// [`EngineError::EmptyFlow`], or [`EngineError::DuplicateActive`] if a
    /// non-terminal execution already exists for the issue.
    pub async fn begin_execution(
        &self,
        issue_id: IssueId,
        flow_id: FlowId,
        level: SensitivityLevel,
        creator: UserId,
    ) -> EngineResult<FlowExecution> {
        if !level.is_specified() {
            return Err(EngineError::InvalidArgument(
                "execution level must be specified".to_string(),
            ));
        }

        let flow = self
            .store
            .get_flow(flow_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("flow {flow_id} not found")))?;
        if !flow.enabled {
            return Err(EngineError::FlowDisabled(flow_id));
        }
        if flow.nodes.is_empty() {
            return Err(EngineError::EmptyFlow(flow_id));
        }

        let execution = self
            .store
            .insert_execution_with_nodes(
                NewExecution {
                    flow_id,
                    issue_id,
                    level,
                    creator: creator.clone(),
                },
                &flow,
            )
            .await
            .map_err(|err| match err {
                StorageError::Conflict(_) => EngineError::DuplicateActive(issue_id),
                other => EngineError::Storage(other),
            })?;

        info!(
            execution_id = %execution.id,
            issue_id = %issue_id,
            flow_id = %flow_id,
            level = %level,
            "Approval flow execution started"
        );

        if let (Some(node_exec), Some(node_def)) = (
            execution.current_node(),
            execution
                .current_position
                .and_then(|p| flow.node_at(p)),
        ) {
            let recipients = node_recipients(node_def, &execution.creator);
            self.enqueue_request_notifications(&execution, node_exec, node_def, &recipients)
                .await;
            self.emit(
                &execution,
                ApprovalEvent::ApprovalRequested {
                    execution_id: execution.id,
                    node_execution_id: node_exec.id,
                    position: node_exec.position,
                    approvers: recipients,
                },
            );
        }

        Ok(execution)
    }

    /// Record one approver decision at `position` of `execution_id`.
    ///
    /// Returns the node and flow states after the decision. A decision on a
    /// node already settled as approved is appended as a redundant record
    /// when it is itself an approval from an authorized approver who has
    /// not voted; everything else at a non-current position fails with
    /// [`EngineError::NotCurrentPosition`].
    pub async fn record_decision(
        &self,
        execution_id: ExecutionId,
        position: u32,
        actor: UserId,
        decision: Decision,
        comment: String,
    ) -> EngineResult<RecordedDecision> {
        for _ in 0..MAX_DECISION_ATTEMPTS {
            let execution = self.load_execution(execution_id).await?;
            if execution.is_terminal() {
                return Err(EngineError::NotActive(execution_id));
            }

            let flow = self
                .store
                .get_flow(execution.flow_id)
                .await?
                .ok_or_else(|| {
                    EngineError::NotFound(format!("flow {} not found", execution.flow_id))
                })?;
            let node_exec = execution.node_at(position).ok_or_else(|| {
                EngineError::InvalidArgument(format!(
                    "execution {execution_id} has no node at position {position}"
                ))
            })?;
            let node_def = flow.node_at(position).ok_or_else(|| {
                EngineError::Internal(format!(
                    "flow {} has no node at position {position}",
                    flow.id
                ))
            })?;

            if execution.current_position != Some(position) {
                if node_exec.status == NodeExecutionStatus::Approved
                    && decision == Decision::Approved
                {
                    return self
                        .append_redundant_approval(
                            &execution, &flow, node_exec, node_def, actor, comment,
                        )
                        .await;
                }
                return Err(EngineError::NotCurrentPosition {
                    execution_id,
                    position,
                });
            }

            self.authorize(&actor, node_def, &execution, &flow).await?;
            if node_exec.has_decision_from(&actor) {
                return Err(EngineError::DuplicateDecision {
                    user: actor,
                    position,
                });
            }

            // Plan against the decision set including the incoming vote.
            let mut approvals = node_exec.approvals.clone();
            approvals.push(Approval {
                id: Default::default(),
                node_execution_id: node_exec.id,
                user_id: actor.clone(),
                decision,
                comment: comment.clone(),
                created_at: self.clock.now(),
            });
            let plan = plan_transition(node_def, execution.last_position(), position, &approvals);

            let mut node_updates = Vec::new();
            if plan.node_status != node_exec.status {
                node_updates.push(NodeStatusUpdate {
                    node_execution_id: node_exec.id,
                    status: plan.node_status,
                });
            }
            let promoted = plan
                .promote_position
                .and_then(|p| execution.node_at(p).map(|n| (p, n)));
            if let Some((_, next)) = promoted {
                node_updates.push(NodeStatusUpdate {
                    node_execution_id: next.id,
                    status: NodeExecutionStatus::InProgress,
                });
            }

            let notifications = self.decision_notifications(
                &execution,
                &flow,
                node_exec,
                node_def,
                promoted.map(|(p, _)| p),
                &plan.node_status,
                plan.flow_status,
            );

            let advance = ExecutionAdvance {
                execution_id,
                expected_status: execution.status,
                expected_position: position,
                expected_approvals: node_exec.approvals.len(),
                approval: NewApproval {
                    node_execution_id: node_exec.id,
                    user_id: actor.clone(),
                    decision,
                    comment: comment.clone(),
                },
                node_updates,
                flow_status: plan.flow_status,
                new_current_position: plan.new_current_position,
                notifications,
            };

            match self.store.advance_execution(advance).await {
                Ok((approval, updated)) => {
                    info!(
                        execution_id = %execution_id,
                        position = position,
                        actor = %approval.user_id,
                        decision = decision.as_str(),
                        flow_status = %updated.status,
                        "Decision recorded"
                    );
                    self.emit_decision_events(&updated, &flow, node_exec, position, &approval);
                    return Ok(RecordedDecision {
                        approval,
                        node_status: plan.node_status,
                        flow_status: updated.status,
                        execution: updated,
                    });
                }
                // Lost a race: re-read and recompute against fresh state.
                Err(StorageError::Conflict(_)) => continue,
                Err(err) => return Err(EngineError::Storage(err)),
            }
        }

        Err(EngineError::Internal(format!(
            "decision on execution {execution_id} kept losing to concurrent updates"
        )))
    }

    /// Cancel a non-terminal execution.
    ///
    /// Permitted only for the execution's creator or a project admin.
    pub async fn cancel(
        &self,
        execution_id: ExecutionId,
        actor: UserId,
        reason: String,
    ) -> EngineResult<FlowExecution> {
        let execution = self.load_execution(execution_id).await?;
        if execution.is_terminal() {
            return Err(EngineError::NotActive(execution_id));
        }
        let flow = self
            .store
            .get_flow(execution.flow_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("flow {} not found", execution.flow_id)))?;

        if actor != execution.creator {
            let is_admin = self
                .authority
                .is_project_admin(&actor, &flow.project)
                .await
                .map_err(|e| EngineError::Authority(e.to_string()))?;
            if !is_admin {
                return Err(EngineError::Unauthorized {
                    user: actor,
                    position: execution.current_position.unwrap_or(0),
                });
            }
        }

        let notifications = vec![NewNotification {
            kind: NotificationKind::ApprovalFlowComplete,
            title: "Approval flow cancelled".to_string(),
            body: reason.clone(),
            recipient: execution.creator.as_str().to_string(),
            execution_id: Some(execution_id),
            node_execution_id: None,
            approval_id: None,
        }];

        let cancelled = self
            .store
            .cancel_execution(execution_id, notifications)
            .await
            .map_err(|err| match err {
                StorageError::Conflict(_) => EngineError::NotActive(execution_id),
                other => EngineError::Storage(other),
            })?;

        info!(
            execution_id = %execution_id,
            actor = %actor,
            "Approval flow execution cancelled"
        );
        self.emit(
            &cancelled,
            ApprovalEvent::FlowCancelled {
                execution_id,
                issue_id: cancelled.issue_id,
                cancelled_by: actor,
                reason,
            },
        );
        Ok(cancelled)
    }

    /// Re-notify the approvers of the node currently awaiting decisions.
    ///
    /// Reminder scheduling is a collaborator concern; this is the entry
    /// point it calls.
    pub async fn remind_current_node(&self, execution_id: ExecutionId) -> EngineResult<()> {
        let execution = self.load_execution(execution_id).await?;
        if execution.is_terminal() {
            return Err(EngineError::NotActive(execution_id));
        }
        let flow = self
            .store
            .get_flow(execution.flow_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("flow {} not found", execution.flow_id)))?;
        let (node_exec, node_def) = match (
            execution.current_node(),
            execution.current_position.and_then(|p| flow.node_at(p)),
        ) {
            (Some(node_exec), Some(node_def)) => (node_exec, node_def),
            _ => return Err(EngineError::NotActive(execution_id)),
        };

        let recipients = node_recipients(node_def, &execution.creator);
        for recipient in &recipients {
            let result = self
                .store
                .create_notification(NewNotification {
                    kind: NotificationKind::ApprovalNodeReminder,
                    title: format!("Reminder: approval pending for {}", node_def.title),
                    body: String::new(),
                    recipient: recipient.clone(),
                    execution_id: Some(execution.id),
                    node_execution_id: Some(node_exec.id),
                    approval_id: None,
                })
                .await;
            if let Err(err) = result {
                warn!(
                    execution_id = %execution.id,
                    recipient = recipient.as_str(),
                    error = %err,
                    "Failed to enqueue reminder notification"
                );
            }
        }

        self.emit(
            &execution,
            ApprovalEvent::NodeReminder {
                execution_id: execution.id,
                node_execution_id: node_exec.id,
                position: node_exec.position,
                approvers: recipients,
            },
        );
        Ok(())
    }

    pub async fn get_execution(&self, execution_id: ExecutionId) -> EngineResult<FlowExecution> {
        self.load_execution(execution_id).await
    }

    pub async fn list_executions(
        &self,
        filter: ExecutionFilter,
        window: QueryWindow,
    ) -> EngineResult<Vec<FlowExecution>> {
        Ok(self.store.list_executions(filter, window).await?)
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn load_execution(&self, execution_id: ExecutionId) -> EngineResult<FlowExecution> {
        self.store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("execution {execution_id} not found")))
    }

    /// Check the actor against the node's approver specification (A2).
    async fn authorize(
        &self,
        actor: &UserId,
        node: &ApprovalNode,
        execution: &FlowExecution,
        flow: &ApprovalFlow,
    ) -> EngineResult<()> {
        let authorized = match node.approver_type {
            ApproverType::User => node.approver_ids.iter().any(|id| id == actor.as_str()),
            ApproverType::SelfApprover => actor == &execution.creator,
            ApproverType::Group | ApproverType::Role => {
                let context = AuthorityContext {
                    project: flow.project.clone(),
                    issue_id: execution.issue_id,
                };
                self.authority
                    .has_role(actor, node.approver_type, &node.approver_ids, &context)
                    .await
                    .map_err(|e| EngineError::Authority(e.to_string()))?
            }
        };
        if authorized {
            Ok(())
        } else {
            Err(EngineError::Unauthorized {
                user: actor.clone(),
                position: node.position,
            })
        }
    }

    /// Append a redundant approval to an already-settled node (idempotent
    /// under the one-decision-per-user constraint); no state transition.
    async fn append_redundant_approval(
        &self,
        execution: &FlowExecution,
        flow: &ApprovalFlow,
        node_exec: &NodeExecution,
        node_def: &ApprovalNode,
        actor: UserId,
        comment: String,
    ) -> EngineResult<RecordedDecision> {
        self.authorize(&actor, node_def, execution, flow).await?;
        if node_exec.has_decision_from(&actor) {
            return Err(EngineError::DuplicateDecision {
                user: actor,
                position: node_exec.position,
            });
        }

        let approval = self
            .store
            .insert_approval(NewApproval {
                node_execution_id: node_exec.id,
                user_id: actor.clone(),
                decision: Decision::Approved,
                comment,
            })
            .await
            .map_err(|err| match err {
                StorageError::Conflict(_) => EngineError::DuplicateDecision {
                    user: actor,
                    position: node_exec.position,
                },
                other => EngineError::Storage(other),
            })?;

        info!(
            execution_id = %execution.id,
            position = node_exec.position,
            actor = %approval.user_id,
            "Redundant approval recorded on settled node"
        );
        Ok(RecordedDecision {
            approval,
            node_status: node_exec.status,
            flow_status: execution.status,
            execution: execution.clone(),
        })
    }

    fn decision_notifications(
        &self,
        execution: &FlowExecution,
        flow: &ApprovalFlow,
        node_exec: &NodeExecution,
        node_def: &ApprovalNode,
        promoted_position: Option<u32>,
        node_status: &NodeExecutionStatus,
        flow_status: ExecutionStatus,
    ) -> Vec<NewNotification> {
        let mut notifications = Vec::new();
        let creator = execution.creator.as_str().to_string();

        if node_status.is_settled() {
            let verdict = match node_status {
                NodeExecutionStatus::Approved => "approved",
                _ => "rejected",
            };
            notifications.push(NewNotification {
                kind: NotificationKind::ApprovalResult,
                title: format!("Step \"{}\" {verdict}", node_def.title),
                body: String::new(),
                recipient: creator.clone(),
                execution_id: Some(execution.id),
                node_execution_id: Some(node_exec.id),
                approval_id: None,
            });
        }

        if let Some(position) = promoted_position {
            if let (Some(next_exec), Some(next_def)) =
                (execution.node_at(position), flow.node_at(position))
            {
                for recipient in node_recipients(next_def, &execution.creator) {
                    notifications.push(NewNotification {
                        kind: NotificationKind::ApprovalRequest,
                        title: format!("Approval required: {}", next_def.title),
                        body: String::new(),
                        recipient,
                        execution_id: Some(execution.id),
                        node_execution_id: Some(next_exec.id),
                        approval_id: None,
                    });
                }
            }
        }

        if flow_status.is_terminal() {
            let verdict = match flow_status {
                ExecutionStatus::Approved => "approved",
                _ => "rejected",
            };
            notifications.push(NewNotification {
                kind: NotificationKind::ApprovalFlowComplete,
                title: format!("Approval flow {verdict}"),
                body: String::new(),
                recipient: creator,
                execution_id: Some(execution.id),
                node_execution_id: None,
                approval_id: None,
            });
        }

        notifications
    }

    async fn enqueue_request_notifications(
        &self,
        execution: &FlowExecution,
        node_exec: &NodeExecution,
        node_def: &ApprovalNode,
        recipients: &[String],
    ) {
        for recipient in recipients {
            let result = self
                .store
                .create_notification(NewNotification {
                    kind: NotificationKind::ApprovalRequest,
                    title: format!("Approval required: {}", node_def.title),
                    body: String::new(),
                    recipient: recipient.clone(),
                    execution_id: Some(execution.id),
                    node_execution_id: Some(node_exec.id),
                    approval_id: None,
                })
                .await;
            if let Err(err) = result {
                warn!(
                    execution_id = %execution.id,
                    recipient = recipient.as_str(),
                    error = %err,
                    "Failed to enqueue approval request notification"
                );
            }
        }
    }

    fn emit_decision_events(
        &self,
        execution: &FlowExecution,
        flow: &ApprovalFlow,
        node_exec: &NodeExecution,
        position: u32,
        approval: &Approval,
    ) {
        let decision_event = match approval.decision {
            Decision::Approved => ApprovalEvent::ApprovalApproved {
                execution_id: execution.id,
                node_execution_id: node_exec.id,
                position,
                approver: approval.user_id.clone(),
            },
            Decision::Rejected => ApprovalEvent::ApprovalRejected {
                execution_id: execution.id,
                node_execution_id: node_exec.id,
                position,
                approver: approval.user_id.clone(),
            },
        };
        self.emit(execution, decision_event);

        if execution.is_terminal() {
            self.emit(
                execution,
                ApprovalEvent::FlowCompleted {
                    execution_id: execution.id,
                    issue_id: execution.issue_id,
                    is_approved: execution.status == ExecutionStatus::Approved,
                },
            );
        } else if let Some(current) = execution.current_position {
            if current != position {
                if let (Some(next_exec), Some(next_def)) =
                    (execution.node_at(current), flow.node_at(current))
                {
                    self.emit(
                        execution,
                        ApprovalEvent::ApprovalRequested {
                            execution_id: execution.id,
                            node_execution_id: next_exec.id,
                            position: current,
                            approvers: node_recipients(next_def, &execution.creator),
                        },
                    );
                }
            }
        }
    }

    fn emit(&self, execution: &FlowExecution, event: ApprovalEvent) {
        self.events.emit(ApprovalEventEnvelope {
            event,
            level: execution.level,
            emitted_at: self.clock.now(),
        });
    }
}

/// Concrete recipients of a node's approval requests.
fn node_recipients(node: &ApprovalNode, creator: &UserId) -> Vec<String> {
    match node.approver_type {
        ApproverType::SelfApprover => vec![creator.as_str().to_string()],
        _ => node.approver_ids.clone(),
    }
}
