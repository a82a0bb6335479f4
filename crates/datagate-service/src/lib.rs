//! DataGate service surface
//!
//! Thin administration and entry-point layer over the engine and storage:
//! rule and flow CRUD with the validation the engine assumes (unique
//! titles, one enabled flow per level, frozen flow structure while
//! executions reference it), execution reads, decision/cancel/check-plan
//! entry points, and the notification read API. Any RPC framing can sit on
//! top; errors carry gRPC-style codes.

#![deny(unsafe_code)]

mod error;
pub mod resource;

pub use error::{ServiceError, ServiceResult};

use datagate_engine::{
    AuthorityResolver, ChangeExtractor, ChangeGate, EventSink, ExecutionEngine, GateConfig,
    PlanCheckRequest, RecordedDecision, Verdict,
};
use datagate_storage::{
    DataGateStore, ExecutionFilter, FlowFilter, FlowPatch, NewFlow, NewNode, NewRule, QueryWindow,
    RulePatch,
};
use datagate_types::{
    ApprovalFlow, ApproverType, Decision, FieldPattern, FlowExecution, FlowId, IssueId,
    Notification, ProjectId, SensitiveDataRule, SensitivityLevel, UserId,
};
use std::sync::Arc;
use tracing::info;

// ── Requests ─────────────────────────────────────────────────────────

/// Payload for `CreateRule`.
#[derive(Debug, Clone)]
pub struct CreateRuleRequest {
    /// Parent resource name, `projects/{project}`
    pub parent: String,
    pub title: String,
    pub description: String,
    pub level: SensitivityLevel,
    pub enabled: bool,
    pub table_pattern: String,
    pub field_patterns: Vec<FieldPattern>,
    pub actor: UserId,
}

/// Payload for `UpdateRule`; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateRuleRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub level: Option<SensitivityLevel>,
    pub enabled: Option<bool>,
    pub table_pattern: Option<String>,
    pub field_patterns: Option<Vec<FieldPattern>>,
}

/// Payload for `CreateFlow`.
#[derive(Debug, Clone)]
pub struct CreateFlowRequest {
    /// Parent resource name, `projects/{project}`
    pub parent: String,
    pub title: String,
    pub description: String,
    pub level: SensitivityLevel,
    pub enabled: bool,
    pub nodes: Vec<NewNode>,
    pub actor: UserId,
}

/// Payload for `UpdateFlow`; replacing `nodes` rewrites the node set.
#[derive(Debug, Clone, Default)]
pub struct UpdateFlowRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub level: Option<SensitivityLevel>,
    pub enabled: Option<bool>,
    pub nodes: Option<Vec<NewNode>>,
}

/// Payload for `CheckPlan`.
#[derive(Debug, Clone)]
pub struct CheckPlanRequest {
    /// Parent resource name, `projects/{project}`
    pub parent: String,
    pub issue_id: IssueId,
    /// Issue creator, recorded on any created execution
    pub creator: UserId,
    pub statement: String,
    pub database: String,
}

// ── Service ──────────────────────────────────────────────────────────

/// The sensitive-data service: administration plus execution entry points.
pub struct SensitiveDataService<S, A, E, X> {
    store: Arc<S>,
    gate: ChangeGate<S, A, E, X>,
}

impl<S, A, E, X> SensitiveDataService<S, A, E, X>
where
    S: DataGateStore,
    A: AuthorityResolver,
    E: EventSink,
    X: ChangeExtractor,
{
    pub fn new(store: Arc<S>, authority: A, events: E, extractor: X, config: GateConfig) -> Self {
        let engine = ExecutionEngine::new(store.clone(), authority, events);
        let gate = ChangeGate::new(engine, extractor, config);
        Self { store, gate }
    }

    pub fn gate(&self) -> &ChangeGate<S, A, E, X> {
        &self.gate
    }

    // ── Rules ────────────────────────────────────────────────────────

    pub async fn list_rules(
        &self,
        parent: &str,
        window: QueryWindow,
    ) -> ServiceResult<Vec<SensitiveDataRule>> {
        let project = resource::parse_project_name(parent)?;
        Ok(self.store.list_rules(&project, window).await?)
    }

    pub async fn get_rule(&self, name: &str) -> ServiceResult<SensitiveDataRule> {
        let (project, id) = resource::parse_rule_name(name)?;
        self.store
            .get_rule(id)
            .await?
            .filter(|rule| rule.project == project)
            .ok_or_else(|| ServiceError::NotFound(format!("rule {name} not found")))
    }

    pub async fn create_rule(
        &self,
        request: CreateRuleRequest,
    ) -> ServiceResult<SensitiveDataRule> {
        let project = resource::parse_project_name(&request.parent)?;
        require(!request.title.is_empty(), "title is required")?;
        require(request.level.is_specified(), "level must be specified")?;

        let rule = self
            .store
            .create_rule(NewRule {
                project: project.clone(),
                title: request.title,
                description: request.description,
                level: request.level,
                enabled: request.enabled,
                table_pattern: request.table_pattern,
                field_patterns: request.field_patterns,
                creator: request.actor,
            })
            .await?;
        info!(project = %project, rule_id = %rule.id, "Sensitive data rule created");
        Ok(rule)
    }

    pub async fn update_rule(
        &self,
        name: &str,
        request: UpdateRuleRequest,
        actor: UserId,
    ) -> ServiceResult<SensitiveDataRule> {
        let existing = self.get_rule(name).await?;
        if let Some(title) = &request.title {
            require(!title.is_empty(), "title is required")?;
        }
        if let Some(level) = request.level {
            require(level.is_specified(), "level must be specified")?;
        }

        let rule = self
            .store
            .update_rule(
                existing.id,
                RulePatch {
                    title: request.title,
                    description: request.description,
                    level: request.level,
                    enabled: request.enabled,
                    table_pattern: request.table_pattern,
                    field_patterns: request.field_patterns,
                    updater: actor,
                },
            )
            .await?;
        info!(rule_id = %rule.id, "Sensitive data rule updated");
        Ok(rule)
    }

    pub async fn delete_rule(&self, name: &str) -> ServiceResult<()> {
        let existing = self.get_rule(name).await?;
        self.store.delete_rule(existing.id).await?;
        info!(rule_id = %existing.id, "Sensitive data rule deleted");
        Ok(())
    }

    // ── Flows ────────────────────────────────────────────────────────

    pub async fn list_flows(
        &self,
        parent: &str,
        level: Option<SensitivityLevel>,
        enabled: Option<bool>,
        window: QueryWindow,
    ) -> ServiceResult<Vec<ApprovalFlow>> {
        let project = resource::parse_project_name(parent)?;
        Ok(self
            .store
            .list_flows(
                FlowFilter {
                    project: Some(project),
                    level,
                    enabled,
                },
                window,
            )
            .await?)
    }

    pub async fn get_flow(&self, name: &str) -> ServiceResult<ApprovalFlow> {
        let (project, id) = resource::parse_flow_name(name)?;
        self.store
            .get_flow(id)
            .await?
            .filter(|flow| flow.project == project)
            .ok_or_else(|| ServiceError::NotFound(format!("flow {name} not found")))
    }

    pub async fn create_flow(&self, request: CreateFlowRequest) -> ServiceResult<ApprovalFlow> {
        let project = resource::parse_project_name(&request.parent)?;
        require(!request.title.is_empty(), "title is required")?;
        require(request.level.is_specified(), "level must be specified")?;
        validate_nodes(&request.nodes)?;

        let flow = self
            .store
            .create_flow(NewFlow {
                project: project.clone(),
                title: request.title,
                description: request.description,
                level: request.level,
                enabled: request.enabled,
                nodes: request.nodes,
                creator: request.actor,
            })
            .await?;
        info!(project = %project, flow_id = %flow.id, level = %flow.level, "Approval flow created");
        Ok(flow)
    }

    pub async fn update_flow(
        &self,
        name: &str,
        request: UpdateFlowRequest,
        actor: UserId,
    ) -> ServiceResult<ApprovalFlow> {
        let existing = self.get_flow(name).await?;
        if let Some(title) = &request.title {
            require(!title.is_empty(), "title is required")?;
        }
        if let Some(level) = request.level {
            require(level.is_specified(), "level must be specified")?;
        }
        if let Some(nodes) = &request.nodes {
            validate_nodes(nodes)?;
            self.require_no_active_executions(existing.id).await?;
        }

        let flow = self
            .store
            .update_flow(
                existing.id,
                FlowPatch {
                    title: request.title,
                    description: request.description,
                    level: request.level,
                    enabled: request.enabled,
                    nodes: request.nodes,
                    updater: actor,
                },
            )
            .await?;
        info!(flow_id = %flow.id, "Approval flow updated");
        Ok(flow)
    }

    pub async fn delete_flow(&self, name: &str) -> ServiceResult<()> {
        let existing = self.get_flow(name).await?;
        self.require_no_active_executions(existing.id).await?;
        self.store.delete_flow(existing.id).await?;
        info!(flow_id = %existing.id, "Approval flow deleted");
        Ok(())
    }

    // ── Executions ───────────────────────────────────────────────────

    pub async fn list_executions(
        &self,
        filter: ExecutionFilter,
        window: QueryWindow,
    ) -> ServiceResult<Vec<FlowExecution>> {
        Ok(self.gate.engine().list_executions(filter, window).await?)
    }

    pub async fn get_execution(&self, name: &str) -> ServiceResult<FlowExecution> {
        let (project, id) = resource::parse_execution_name(name)?;
        let execution = self.gate.engine().get_execution(id).await?;
        self.check_execution_project(&execution, &project, name)
            .await?;
        Ok(execution)
    }

    /// Record one approver decision; see the engine for the state machine.
    pub async fn record_decision(
        &self,
        name: &str,
        position: u32,
        actor: UserId,
        decision: Decision,
        comment: String,
    ) -> ServiceResult<RecordedDecision> {
        let (project, id) = resource::parse_execution_name(name)?;
        let execution = self.gate.engine().get_execution(id).await?;
        self.check_execution_project(&execution, &project, name)
            .await?;
        Ok(self
            .gate
            .engine()
            .record_decision(id, position, actor, decision, comment)
            .await?)
    }

    pub async fn cancel_execution(
        &self,
        name: &str,
        actor: UserId,
        reason: String,
    ) -> ServiceResult<FlowExecution> {
        let (project, id) = resource::parse_execution_name(name)?;
        let execution = self.gate.engine().get_execution(id).await?;
        self.check_execution_project(&execution, &project, name)
            .await?;
        Ok(self.gate.engine().cancel(id, actor, reason).await?)
    }

    /// Gate a proposed plan: admit, block on an execution, or deny.
    pub async fn check_plan(&self, request: CheckPlanRequest) -> ServiceResult<Verdict> {
        let project = resource::parse_project_name(&request.parent)?;
        require(!request.statement.is_empty(), "statement is required")?;
        Ok(self
            .gate
            .check_plan(&PlanCheckRequest {
                project,
                issue_id: request.issue_id,
                creator: request.creator,
                statement: request.statement,
                database: request.database,
            })
            .await?)
    }

    // ── Notifications ────────────────────────────────────────────────

    pub async fn list_notifications(
        &self,
        recipient: &str,
        unread_only: bool,
        window: QueryWindow,
    ) -> ServiceResult<Vec<Notification>> {
        require(!recipient.is_empty(), "recipient is required")?;
        Ok(self
            .store
            .list_notifications(recipient, unread_only, window)
            .await?)
    }

    pub async fn mark_notification_read(&self, name: &str) -> ServiceResult<Notification> {
        let (_, id) = resource::parse_notification_name(name)?;
        Ok(self.store.mark_notification_read(id).await?)
    }

    pub async fn delete_notification(&self, name: &str) -> ServiceResult<()> {
        let (_, id) = resource::parse_notification_name(name)?;
        Ok(self.store.delete_notification(id).await?)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Flow structure is frozen while any non-terminal execution
    /// references the flow.
    async fn require_no_active_executions(&self, flow_id: FlowId) -> ServiceResult<()> {
        let executions = self
            .store
            .list_executions(
                ExecutionFilter {
                    flow_id: Some(flow_id),
                    ..ExecutionFilter::default()
                },
                QueryWindow::default(),
            )
            .await?;
        if executions.iter().any(|e| !e.is_terminal()) {
            return Err(ServiceError::FailedPrecondition(format!(
                "flow {flow_id} has active executions; structure is frozen"
            )));
        }
        Ok(())
    }

    /// Verify the execution belongs to the project named in the resource.
    async fn check_execution_project(
        &self,
        execution: &FlowExecution,
        project: &ProjectId,
        name: &str,
    ) -> ServiceResult<()> {
        let flow = self
            .store
            .get_flow(execution.flow_id)
            .await?
            .ok_or_else(|| {
                ServiceError::Internal(format!("flow {} missing for execution", execution.flow_id))
            })?;
        if &flow.project != project {
            return Err(ServiceError::NotFound(format!(
                "execution {name} not found"
            )));
        }
        Ok(())
    }
}

fn require(condition: bool, message: &str) -> ServiceResult<()> {
    if condition {
        Ok(())
    } else {
        Err(ServiceError::InvalidArgument(message.to_string()))
    }
}

fn validate_nodes(nodes: &[NewNode]) -> ServiceResult<()> {
    require(!nodes.is_empty(), "at least one node is required")?;

    let mut positions: Vec<u32> = nodes.iter().map(|n| n.position).collect();
    positions.sort_unstable();
    let contiguous = positions
        .iter()
        .enumerate()
        .all(|(i, p)| *p == (i as u32) + 1);
    require(
        contiguous,
        "node positions must be 1-based, unique, and contiguous",
    )?;

    for node in nodes {
        require(!node.title.is_empty(), "node title is required")?;
        if node.approver_type != ApproverType::SelfApprover {
            require(
                !node.approver_ids.is_empty(),
                "node approvers are required unless the node is self-approved",
            )?;
        }
    }
    Ok(())
}
