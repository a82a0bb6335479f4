use crate::StorageResult;
use async_trait::async_trait;
use datagate_types::{
    Approval, ApprovalFlow, ApprovalId, ApprovalType, ApproverType, Decision, ExecutionId,
    ExecutionStatus, FieldPattern, FlowExecution, FlowId, IssueId, NodeExecutionId,
    NodeExecutionStatus, Notification, NotificationId, NotificationKind, ProjectId, RuleId,
    SensitiveDataChange, SensitiveDataRule, SensitivityLevel, UserId,
};

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

// ── Write payloads ───────────────────────────────────────────────────

/// Payload for creating a sensitive data rule; the store assigns id and
/// timestamps.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub project: ProjectId,
    pub title: String,
    pub description: String,
    pub level: SensitivityLevel,
    pub enabled: bool,
    pub table_pattern: String,
    pub field_patterns: Vec<FieldPattern>,
    pub creator: UserId,
}

/// Partial update of a rule; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RulePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub level: Option<SensitivityLevel>,
    pub enabled: Option<bool>,
    pub table_pattern: Option<String>,
    pub field_patterns: Option<Vec<FieldPattern>>,
    pub updater: UserId,
}

/// Payload for one node of a new (or replaced) flow.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub position: u32,
    pub title: String,
    pub description: String,
    pub approver_type: ApproverType,
    pub approver_ids: Vec<String>,
    pub approval_type: ApprovalType,
}

/// Payload for creating an approval flow with its nodes.
#[derive(Debug, Clone)]
pub struct NewFlow {
    pub project: ProjectId,
    pub title: String,
    pub description: String,
    pub level: SensitivityLevel,
    pub enabled: bool,
    pub nodes: Vec<NewNode>,
    pub creator: UserId,
}

/// Partial update of a flow. Replacing `nodes` rewrites the node set; the
/// caller is responsible for rejecting structure edits while executions
/// reference the flow.
#[derive(Debug, Clone, Default)]
pub struct FlowPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub level: Option<SensitivityLevel>,
    pub enabled: Option<bool>,
    pub nodes: Option<Vec<NewNode>>,
    pub updater: UserId,
}

/// Payload for creating an execution; node executions are derived from the
/// flow snapshot passed alongside.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub flow_id: FlowId,
    pub issue_id: IssueId,
    pub level: SensitivityLevel,
    pub creator: UserId,
}

/// Payload for one approval decision row.
#[derive(Debug, Clone)]
pub struct NewApproval {
    pub node_execution_id: NodeExecutionId,
    pub user_id: UserId,
    pub decision: Decision,
    pub comment: String,
}

/// Payload for one outbound notification record.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub recipient: String,
    pub execution_id: Option<ExecutionId>,
    pub node_execution_id: Option<NodeExecutionId>,
    pub approval_id: Option<ApprovalId>,
}

/// Payload for one sensitive-change audit row.
#[derive(Debug, Clone)]
pub struct NewChange {
    pub execution_id: Option<ExecutionId>,
    pub issue_id: IssueId,
    pub table: String,
    pub field: String,
    pub level: SensitivityLevel,
    pub rule_id: RuleId,
}

/// New status for one node execution inside an [`ExecutionAdvance`].
#[derive(Debug, Clone, Copy)]
pub struct NodeStatusUpdate {
    pub node_execution_id: NodeExecutionId,
    pub status: NodeExecutionStatus,
}

/// All effects of a single recorded decision, applied in one transaction.
///
/// The `expected_*` fields are the state the caller computed against. The
/// store takes the execution lock, re-checks them, and returns
/// [`crate::StorageError::Conflict`] on mismatch so the caller can re-read
/// and recompute — this is how contending decisions on one execution are
/// serialized.
#[derive(Debug, Clone)]
pub struct ExecutionAdvance {
    pub execution_id: ExecutionId,
    /// Status the caller observed; must still hold under the lock
    pub expected_status: ExecutionStatus,
    /// Current position the caller observed
    pub expected_position: u32,
    /// Number of approvals the caller observed on the decided node
    pub expected_approvals: usize,
    /// The decision to append
    pub approval: NewApproval,
    /// Node execution status changes (decided node, promoted node)
    pub node_updates: Vec<NodeStatusUpdate>,
    /// Execution status after the decision
    pub flow_status: ExecutionStatus,
    /// Current position after the decision; `None` when terminal
    pub new_current_position: Option<u32>,
    /// Notifications enqueued atomically with the transition
    pub notifications: Vec<NewNotification>,
}

// ── Filters ──────────────────────────────────────────────────────────

/// Filter for listing approval flows.
#[derive(Debug, Clone, Default)]
pub struct FlowFilter {
    pub project: Option<ProjectId>,
    pub level: Option<SensitivityLevel>,
    pub enabled: Option<bool>,
}

/// Filter for listing flow executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub flow_id: Option<FlowId>,
    pub issue_id: Option<IssueId>,
    pub level: Option<SensitivityLevel>,
    pub status: Option<ExecutionStatus>,
}

// ── Stores ───────────────────────────────────────────────────────────

/// Storage interface for sensitive data rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Insert a rule; rejects a duplicate `(project, title)` with
    /// [`crate::StorageError::Conflict`].
    async fn create_rule(&self, rule: NewRule) -> StorageResult<SensitiveDataRule>;

    async fn get_rule(&self, id: RuleId) -> StorageResult<Option<SensitiveDataRule>>;

    /// List a project's rules newest-first.
    async fn list_rules(
        &self,
        project: &ProjectId,
        window: QueryWindow,
    ) -> StorageResult<Vec<SensitiveDataRule>>;

    async fn update_rule(&self, id: RuleId, patch: RulePatch) -> StorageResult<SensitiveDataRule>;

    async fn delete_rule(&self, id: RuleId) -> StorageResult<()>;
}

/// Storage interface for approval flows with their nodes.
///
/// A flow aggregate is always read and written whole; at most one enabled
/// flow exists per `(project, level)` (enforced with a partial unique
/// constraint, surfaced as [`crate::StorageError::Conflict`]).
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn create_flow(&self, flow: NewFlow) -> StorageResult<ApprovalFlow>;

    async fn get_flow(&self, id: FlowId) -> StorageResult<Option<ApprovalFlow>>;

    async fn list_flows(
        &self,
        filter: FlowFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<ApprovalFlow>>;

    async fn update_flow(&self, id: FlowId, patch: FlowPatch) -> StorageResult<ApprovalFlow>;

    async fn delete_flow(&self, id: FlowId) -> StorageResult<()>;
}

/// Storage interface for flow executions, node executions, and approvals.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Atomically insert an execution plus one node execution per flow
    /// node: the lowest position starts in progress, the rest pending.
    /// At most one non-terminal execution may exist per issue; a second
    /// insert surfaces as [`crate::StorageError::Conflict`].
    async fn insert_execution_with_nodes(
        &self,
        execution: NewExecution,
        flow: &ApprovalFlow,
    ) -> StorageResult<FlowExecution>;

    async fn get_execution(&self, id: ExecutionId) -> StorageResult<Option<FlowExecution>>;

    /// List executions newest-first.
    async fn list_executions(
        &self,
        filter: ExecutionFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<FlowExecution>>;

    /// The single non-terminal execution for an issue, if any.
    async fn list_active_execution_for_issue(
        &self,
        issue: IssueId,
    ) -> StorageResult<Option<FlowExecution>>;

    /// The most recently created execution for an issue, terminal or not.
    async fn latest_execution_for_issue(
        &self,
        issue: IssueId,
    ) -> StorageResult<Option<FlowExecution>>;

    /// Apply all effects of one decision in a single transaction. See
    /// [`ExecutionAdvance`] for the expectation-checking contract.
    async fn advance_execution(
        &self,
        advance: ExecutionAdvance,
    ) -> StorageResult<(Approval, FlowExecution)>;

    /// Append a decision row without any state transition (redundant
    /// approvals on an already-settled node). The `(node_execution, user)`
    /// uniqueness constraint still applies.
    async fn insert_approval(&self, approval: NewApproval) -> StorageResult<Approval>;

    /// Transition a non-terminal execution to cancelled; a terminal
    /// execution surfaces as [`crate::StorageError::Conflict`].
    async fn cancel_execution(
        &self,
        id: ExecutionId,
        notifications: Vec<NewNotification>,
    ) -> StorageResult<FlowExecution>;
}

/// Storage interface for sensitive-change audit rows.
#[async_trait]
pub trait ChangeStore: Send + Sync {
    async fn record_changes(&self, changes: Vec<NewChange>) -> StorageResult<()>;

    async fn list_changes_for_issue(
        &self,
        issue: IssueId,
    ) -> StorageResult<Vec<SensitiveDataChange>>;
}

/// Storage interface for outbound notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, notification: NewNotification)
        -> StorageResult<Notification>;

    /// List a recipient's notifications newest-first.
    async fn list_notifications(
        &self,
        recipient: &str,
        unread_only: bool,
        window: QueryWindow,
    ) -> StorageResult<Vec<Notification>>;

    async fn mark_notification_read(&self, id: NotificationId) -> StorageResult<Notification>;

    async fn delete_notification(&self, id: NotificationId) -> StorageResult<()>;
}

/// Unified storage bundle used by the engine and service surfaces.
pub trait DataGateStore:
    RuleStore + FlowStore + ExecutionStore + ChangeStore + NotificationStore + Send + Sync
{
}

impl<T> DataGateStore for T where
    T: RuleStore + FlowStore + ExecutionStore + ChangeStore + NotificationStore + Send + Sync
{
}
