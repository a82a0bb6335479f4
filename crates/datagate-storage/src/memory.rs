//! In-memory reference implementation for the DataGate storage traits.
//!
//! Deterministic and test-friendly. All state lives behind a single lock so
//! the compound execution operations are atomic exactly like their
//! transactional Postgres counterparts. Production deployments should use
//! the Postgres adapter as the source of truth.

use crate::traits::{
    ChangeStore, ExecutionAdvance, ExecutionFilter, ExecutionStore, FlowFilter, FlowPatch,
    FlowStore, NewApproval, NewChange, NewExecution, NewFlow, NewNotification, NewRule,
    NotificationStore, QueryWindow, RulePatch, RuleStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use datagate_types::{
    Approval, ApprovalFlow, ApprovalId, ApprovalNode, ExecutionId, ExecutionStatus, FlowExecution,
    FlowId, IssueId, NodeExecution, NodeExecutionId, NodeExecutionStatus, NodeId, Notification,
    NotificationId, ProjectId, RuleId, SensitiveDataChange, SensitiveDataRule,
};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    rules: HashMap<i64, SensitiveDataRule>,
    flows: HashMap<i64, ApprovalFlow>,
    executions: HashMap<i64, FlowExecution>,
    changes: Vec<SensitiveDataChange>,
    notifications: HashMap<i64, Notification>,
    next_rule: i64,
    next_flow: i64,
    next_node: i64,
    next_execution: i64,
    next_node_execution: i64,
    next_approval: i64,
    next_notification: i64,
}

impl MemoryState {
    fn assign(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn push_notifications(&mut self, notifications: Vec<NewNotification>) {
        for n in notifications {
            let id = Self::assign(&mut self.next_notification);
            self.notifications.insert(
                id,
                Notification {
                    id: NotificationId::new(id),
                    kind: n.kind,
                    title: n.title,
                    body: n.body,
                    recipient: n.recipient,
                    execution_id: n.execution_id,
                    node_execution_id: n.node_execution_id,
                    approval_id: n.approval_id,
                    read: false,
                    created_at: Utc::now(),
                },
            );
        }
    }

    fn node_execution_mut(
        &mut self,
        id: NodeExecutionId,
    ) -> Option<(&mut FlowExecution, usize)> {
        for execution in self.executions.values_mut() {
            if let Some(index) = execution.node_executions.iter().position(|n| n.id == id) {
                return Some((execution, index));
            }
        }
        None
    }
}

/// In-memory DataGate storage adapter.
#[derive(Default)]
pub struct InMemoryDataGateStore {
    state: RwLock<MemoryState>,
}

impl InMemoryDataGateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StorageError::Backend("state lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StorageError::Backend("state lock poisoned".to_string()))
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[async_trait]
impl RuleStore for InMemoryDataGateStore {
    async fn create_rule(&self, rule: NewRule) -> StorageResult<SensitiveDataRule> {
        let mut state = self.write()?;

        if state
            .rules
            .values()
            .any(|r| r.project == rule.project && r.title == rule.title)
        {
            return Err(StorageError::Conflict(format!(
                "rule \"{}\" already exists in project {}",
                rule.title, rule.project
            )));
        }

        let id = MemoryState::assign(&mut state.next_rule);
        let now = Utc::now();
        let record = SensitiveDataRule {
            id: RuleId::new(id),
            project: rule.project,
            title: rule.title,
            description: rule.description,
            level: rule.level,
            enabled: rule.enabled,
            table_pattern: rule.table_pattern,
            field_patterns: rule.field_patterns,
            creator: rule.creator.clone(),
            updater: rule.creator,
            created_at: now,
            updated_at: now,
        };
        state.rules.insert(id, record.clone());
        Ok(record)
    }

    async fn get_rule(&self, id: RuleId) -> StorageResult<Option<SensitiveDataRule>> {
        Ok(self.read()?.rules.get(&id.0).cloned())
    }

    async fn list_rules(
        &self,
        project: &ProjectId,
        window: QueryWindow,
    ) -> StorageResult<Vec<SensitiveDataRule>> {
        let state = self.read()?;
        let mut rules: Vec<_> = state
            .rules
            .values()
            .filter(|r| &r.project == project)
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(apply_window(rules, window))
    }

    async fn update_rule(&self, id: RuleId, patch: RulePatch) -> StorageResult<SensitiveDataRule> {
        let mut state = self.write()?;

        let project = state
            .rules
            .get(&id.0)
            .map(|r| r.project.clone())
            .ok_or_else(|| StorageError::NotFound(format!("rule {id} not found")))?;
        if let Some(title) = &patch.title {
            if state
                .rules
                .values()
                .any(|r| r.id != id && r.project == project && r.title == *title)
            {
                return Err(StorageError::Conflict(format!(
                    "rule \"{title}\" already exists in project {project}"
                )));
            }
        }

        let rule = state
            .rules
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::NotFound(format!("rule {id} not found")))?;

        if let Some(title) = patch.title {
            rule.title = title;
        }
        if let Some(description) = patch.description {
            rule.description = description;
        }
        if let Some(level) = patch.level {
            rule.level = level;
        }
        if let Some(enabled) = patch.enabled {
            rule.enabled = enabled;
        }
        if let Some(table_pattern) = patch.table_pattern {
            rule.table_pattern = table_pattern;
        }
        if let Some(field_patterns) = patch.field_patterns {
            rule.field_patterns = field_patterns;
        }
        rule.updater = patch.updater;
        rule.updated_at = Utc::now();
        Ok(rule.clone())
    }

    async fn delete_rule(&self, id: RuleId) -> StorageResult<()> {
        let mut state = self.write()?;
        state
            .rules
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("rule {id} not found")))
    }
}

fn build_nodes(state: &mut MemoryState, flow_id: FlowId, nodes: &[crate::NewNode]) -> Vec<ApprovalNode> {
    let mut built: Vec<ApprovalNode> = nodes
        .iter()
        .map(|n| ApprovalNode {
            id: NodeId::new(MemoryState::assign(&mut state.next_node)),
            flow_id,
            position: n.position,
            title: n.title.clone(),
            description: n.description.clone(),
            approver_type: n.approver_type,
            approver_ids: n.approver_ids.clone(),
            approval_type: n.approval_type,
        })
        .collect();
    built.sort_by_key(|n| n.position);
    built
}

fn enabled_level_conflict(
    state: &MemoryState,
    project: &ProjectId,
    level: datagate_types::SensitivityLevel,
    exclude: Option<FlowId>,
) -> bool {
    state.flows.values().any(|f| {
        f.enabled
            && f.level == level
            && &f.project == project
            && exclude.map(|id| f.id != id).unwrap_or(true)
    })
}

#[async_trait]
impl FlowStore for InMemoryDataGateStore {
    async fn create_flow(&self, flow: NewFlow) -> StorageResult<ApprovalFlow> {
        let mut state = self.write()?;

        if flow.enabled && enabled_level_conflict(&state, &flow.project, flow.level, None) {
            return Err(StorageError::Conflict(format!(
                "an enabled {} flow already exists in project {}",
                flow.level, flow.project
            )));
        }
        if state
            .flows
            .values()
            .any(|f| f.project == flow.project && f.title == flow.title)
        {
            return Err(StorageError::Conflict(format!(
                "flow \"{}\" already exists in project {}",
                flow.title, flow.project
            )));
        }

        let id = FlowId::new(MemoryState::assign(&mut state.next_flow));
        let nodes = build_nodes(&mut state, id, &flow.nodes);
        let now = Utc::now();
        let record = ApprovalFlow {
            id,
            project: flow.project,
            title: flow.title,
            description: flow.description,
            level: flow.level,
            enabled: flow.enabled,
            nodes,
            creator: flow.creator.clone(),
            updater: flow.creator,
            created_at: now,
            updated_at: now,
        };
        state.flows.insert(id.0, record.clone());
        Ok(record)
    }

    async fn get_flow(&self, id: FlowId) -> StorageResult<Option<ApprovalFlow>> {
        Ok(self.read()?.flows.get(&id.0).cloned())
    }

    async fn list_flows(
        &self,
        filter: FlowFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<ApprovalFlow>> {
        let state = self.read()?;
        let mut flows: Vec<_> = state
            .flows
            .values()
            .filter(|f| {
                filter
                    .project
                    .as_ref()
                    .map(|p| &f.project == p)
                    .unwrap_or(true)
                    && filter.level.map(|l| f.level == l).unwrap_or(true)
                    && filter.enabled.map(|e| f.enabled == e).unwrap_or(true)
            })
            .cloned()
            .collect();
        flows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(apply_window(flows, window))
    }

    async fn update_flow(&self, id: FlowId, patch: FlowPatch) -> StorageResult<ApprovalFlow> {
        let mut state = self.write()?;

        let current = state
            .flows
            .get(&id.0)
            .ok_or_else(|| StorageError::NotFound(format!("flow {id} not found")))?
            .clone();

        let enabled = patch.enabled.unwrap_or(current.enabled);
        let level = patch.level.unwrap_or(current.level);
        if enabled && enabled_level_conflict(&state, &current.project, level, Some(id)) {
            return Err(StorageError::Conflict(format!(
                "an enabled {} flow already exists in project {}",
                level, current.project
            )));
        }

        let nodes = match &patch.nodes {
            Some(new_nodes) => build_nodes(&mut state, id, new_nodes),
            None => current.nodes.clone(),
        };

        let flow = state
            .flows
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::NotFound(format!("flow {id} not found")))?;

        if let Some(title) = patch.title {
            flow.title = title;
        }
        if let Some(description) = patch.description {
            flow.description = description;
        }
        flow.level = level;
        flow.enabled = enabled;
        flow.nodes = nodes;
        flow.updater = patch.updater;
        flow.updated_at = Utc::now();
        Ok(flow.clone())
    }

    async fn delete_flow(&self, id: FlowId) -> StorageResult<()> {
        let mut state = self.write()?;
        state
            .flows
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("flow {id} not found")))
    }
}

#[async_trait]
impl ExecutionStore for InMemoryDataGateStore {
    async fn insert_execution_with_nodes(
        &self,
        execution: NewExecution,
        flow: &ApprovalFlow,
    ) -> StorageResult<FlowExecution> {
        let mut state = self.write()?;

        if state
            .executions
            .values()
            .any(|e| e.issue_id == execution.issue_id && !e.is_terminal())
        {
            return Err(StorageError::Conflict(format!(
                "issue {} already has an active execution",
                execution.issue_id
            )));
        }

        let id = ExecutionId::new(MemoryState::assign(&mut state.next_execution));
        let mut nodes: Vec<&ApprovalNode> = flow.nodes.iter().collect();
        nodes.sort_by_key(|n| n.position);
        let first_position = nodes
            .first()
            .map(|n| n.position)
            .ok_or_else(|| StorageError::InvalidInput("flow has no nodes".to_string()))?;

        let node_executions: Vec<NodeExecution> = nodes
            .iter()
            .map(|node| NodeExecution {
                id: NodeExecutionId::new(MemoryState::assign(&mut state.next_node_execution)),
                execution_id: id,
                node_id: node.id,
                position: node.position,
                status: if node.position == first_position {
                    NodeExecutionStatus::InProgress
                } else {
                    NodeExecutionStatus::Pending
                },
                approvals: Vec::new(),
            })
            .collect();

        let now = Utc::now();
        let record = FlowExecution {
            id,
            flow_id: execution.flow_id,
            issue_id: execution.issue_id,
            level: execution.level,
            status: ExecutionStatus::InProgress,
            current_position: Some(first_position),
            node_executions,
            creator: execution.creator,
            created_at: now,
            updated_at: now,
        };
        state.executions.insert(id.0, record.clone());
        Ok(record)
    }

    async fn get_execution(&self, id: ExecutionId) -> StorageResult<Option<FlowExecution>> {
        Ok(self.read()?.executions.get(&id.0).cloned())
    }

    async fn list_executions(
        &self,
        filter: ExecutionFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<FlowExecution>> {
        let state = self.read()?;
        let mut executions: Vec<_> = state
            .executions
            .values()
            .filter(|e| {
                filter.flow_id.map(|f| e.flow_id == f).unwrap_or(true)
                    && filter.issue_id.map(|i| e.issue_id == i).unwrap_or(true)
                    && filter.level.map(|l| e.level == l).unwrap_or(true)
                    && filter.status.map(|s| e.status == s).unwrap_or(true)
            })
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(apply_window(executions, window))
    }

    async fn list_active_execution_for_issue(
        &self,
        issue: IssueId,
    ) -> StorageResult<Option<FlowExecution>> {
        let state = self.read()?;
        Ok(state
            .executions
            .values()
            .find(|e| e.issue_id == issue && !e.is_terminal())
            .cloned())
    }

    async fn latest_execution_for_issue(
        &self,
        issue: IssueId,
    ) -> StorageResult<Option<FlowExecution>> {
        let state = self.read()?;
        Ok(state
            .executions
            .values()
            .filter(|e| e.issue_id == issue)
            .max_by_key(|e| e.id)
            .cloned())
    }

    async fn advance_execution(
        &self,
        advance: ExecutionAdvance,
    ) -> StorageResult<(Approval, FlowExecution)> {
        let mut state = self.write()?;
        let approval_id = ApprovalId::new(MemoryState::assign(&mut state.next_approval));

        let execution = state
            .executions
            .get_mut(&advance.execution_id.0)
            .ok_or_else(|| {
                StorageError::NotFound(format!("execution {} not found", advance.execution_id))
            })?;

        if execution.status != advance.expected_status
            || execution.current_position != Some(advance.expected_position)
        {
            return Err(StorageError::Conflict(
                "execution changed concurrently".to_string(),
            ));
        }

        let node_index = execution
            .node_executions
            .iter()
            .position(|n| n.id == advance.approval.node_execution_id)
            .ok_or_else(|| {
                StorageError::NotFound(format!(
                    "node execution {} not found",
                    advance.approval.node_execution_id
                ))
            })?;

        {
            let node = &execution.node_executions[node_index];
            if node.approvals.len() != advance.expected_approvals {
                return Err(StorageError::Conflict(
                    "node approvals changed concurrently".to_string(),
                ));
            }
            if node.has_decision_from(&advance.approval.user_id) {
                return Err(StorageError::Conflict(format!(
                    "user {} already decided on node execution {}",
                    advance.approval.user_id, node.id
                )));
            }
        }

        let approval = Approval {
            id: approval_id,
            node_execution_id: advance.approval.node_execution_id,
            user_id: advance.approval.user_id,
            decision: advance.approval.decision,
            comment: advance.approval.comment,
            created_at: Utc::now(),
        };
        execution.node_executions[node_index]
            .approvals
            .push(approval.clone());

        for update in &advance.node_updates {
            if let Some(node) = execution
                .node_executions
                .iter_mut()
                .find(|n| n.id == update.node_execution_id)
            {
                node.status = update.status;
            }
        }
        execution.status = advance.flow_status;
        execution.current_position = advance.new_current_position;
        execution.updated_at = Utc::now();
        let snapshot = execution.clone();

        state.push_notifications(advance.notifications);
        Ok((approval, snapshot))
    }

    async fn insert_approval(&self, approval: NewApproval) -> StorageResult<Approval> {
        let mut state = self.write()?;
        let approval_id = ApprovalId::new(MemoryState::assign(&mut state.next_approval));

        let (execution, node_index) = state
            .node_execution_mut(approval.node_execution_id)
            .ok_or_else(|| {
                StorageError::NotFound(format!(
                    "node execution {} not found",
                    approval.node_execution_id
                ))
            })?;

        if execution.is_terminal() {
            return Err(StorageError::InvariantViolation(format!(
                "execution {} is terminal",
                execution.id
            )));
        }
        if execution.node_executions[node_index].has_decision_from(&approval.user_id) {
            return Err(StorageError::Conflict(format!(
                "user {} already decided on node execution {}",
                approval.user_id, approval.node_execution_id
            )));
        }

        let record = Approval {
            id: approval_id,
            node_execution_id: approval.node_execution_id,
            user_id: approval.user_id,
            decision: approval.decision,
            comment: approval.comment,
            created_at: Utc::now(),
        };
        execution.node_executions[node_index]
            .approvals
            .push(record.clone());
        Ok(record)
    }

    async fn cancel_execution(
        &self,
        id: ExecutionId,
        notifications: Vec<NewNotification>,
    ) -> StorageResult<FlowExecution> {
        let mut state = self.write()?;

        let execution = state
            .executions
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::NotFound(format!("execution {id} not found")))?;

        if execution.is_terminal() {
            return Err(StorageError::Conflict(format!(
                "execution {id} is already terminal"
            )));
        }

        execution.status = ExecutionStatus::Cancelled;
        execution.current_position = None;
        execution.updated_at = Utc::now();
        let snapshot = execution.clone();

        state.push_notifications(notifications);
        Ok(snapshot)
    }
}

#[async_trait]
impl ChangeStore for InMemoryDataGateStore {
    async fn record_changes(&self, changes: Vec<NewChange>) -> StorageResult<()> {
        let mut state = self.write()?;
        let now = Utc::now();
        for change in changes {
            state.changes.push(SensitiveDataChange {
                execution_id: change.execution_id,
                issue_id: change.issue_id,
                table: change.table,
                field: change.field,
                level: change.level,
                rule_id: change.rule_id,
                created_at: now,
            });
        }
        Ok(())
    }

    async fn list_changes_for_issue(
        &self,
        issue: IssueId,
    ) -> StorageResult<Vec<SensitiveDataChange>> {
        let state = self.read()?;
        Ok(state
            .changes
            .iter()
            .filter(|c| c.issue_id == issue)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationStore for InMemoryDataGateStore {
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> StorageResult<Notification> {
        let mut state = self.write()?;
        let id = MemoryState::assign(&mut state.next_notification);
        let record = Notification {
            id: NotificationId::new(id),
            kind: notification.kind,
            title: notification.title,
            body: notification.body,
            recipient: notification.recipient,
            execution_id: notification.execution_id,
            node_execution_id: notification.node_execution_id,
            approval_id: notification.approval_id,
            read: false,
            created_at: Utc::now(),
        };
        state.notifications.insert(id, record.clone());
        Ok(record)
    }

    async fn list_notifications(
        &self,
        recipient: &str,
        unread_only: bool,
        window: QueryWindow,
    ) -> StorageResult<Vec<Notification>> {
        let state = self.read()?;
        let mut notifications: Vec<_> = state
            .notifications
            .values()
            .filter(|n| n.recipient == recipient && (!unread_only || !n.read))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(apply_window(notifications, window))
    }

    async fn mark_notification_read(&self, id: NotificationId) -> StorageResult<Notification> {
        let mut state = self.write()?;
        let notification = state
            .notifications
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::NotFound(format!("notification {id} not found")))?;
        notification.read = true;
        Ok(notification.clone())
    }

    async fn delete_notification(&self, id: NotificationId) -> StorageResult<()> {
        let mut state = self.write()?;
        state
            .notifications
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("notification {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewNode;
    use datagate_types::{ApprovalType, ApproverType, Decision, SensitivityLevel, UserId};

    fn sample_flow(level: SensitivityLevel, enabled: bool) -> NewFlow {
        NewFlow {
            project: ProjectId::new("proj-1"),
            title: format!("{level} flow {enabled}"),
            description: String::new(),
            level,
            enabled,
            nodes: vec![
                NewNode {
                    position: 1,
                    title: "review".into(),
                    description: String::new(),
                    approver_type: ApproverType::User,
                    approver_ids: vec!["alice".into(), "bob".into()],
                    approval_type: ApprovalType::All,
                },
                NewNode {
                    position: 2,
                    title: "sign-off".into(),
                    description: String::new(),
                    approver_type: ApproverType::Role,
                    approver_ids: vec!["dba".into()],
                    approval_type: ApprovalType::All,
                },
            ],
            creator: UserId::new("admin"),
        }
    }

    async fn seeded_execution(store: &InMemoryDataGateStore) -> FlowExecution {
        let flow = store
            .create_flow(sample_flow(SensitivityLevel::High, true))
            .await
            .unwrap();
        store
            .insert_execution_with_nodes(
                NewExecution {
                    flow_id: flow.id,
                    issue_id: IssueId::new(42),
                    level: SensitivityLevel::High,
                    creator: UserId::new("carol"),
                },
                &flow,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_rule_title_is_a_conflict() {
        let store = InMemoryDataGateStore::new();
        let rule = NewRule {
            project: ProjectId::new("proj-1"),
            title: "pii".into(),
            description: String::new(),
            level: SensitivityLevel::High,
            enabled: true,
            table_pattern: String::new(),
            field_patterns: Vec::new(),
            creator: UserId::new("admin"),
        };
        store.create_rule(rule.clone()).await.unwrap();
        let result = store.create_rule(rule).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn second_enabled_flow_for_level_is_a_conflict() {
        let store = InMemoryDataGateStore::new();
        store
            .create_flow(sample_flow(SensitivityLevel::High, true))
            .await
            .unwrap();
        let result = store.create_flow(sample_flow(SensitivityLevel::High, true)).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // A disabled flow at the same level is fine.
        store
            .create_flow(sample_flow(SensitivityLevel::High, false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn one_active_execution_per_issue() {
        let store = InMemoryDataGateStore::new();
        let execution = seeded_execution(&store).await;
        assert_eq!(execution.status, ExecutionStatus::InProgress);
        assert_eq!(execution.current_position, Some(1));

        let flow = store.get_flow(execution.flow_id).await.unwrap().unwrap();
        let result = store
            .insert_execution_with_nodes(
                NewExecution {
                    flow_id: flow.id,
                    issue_id: IssueId::new(42),
                    level: SensitivityLevel::High,
                    creator: UserId::new("carol"),
                },
                &flow,
            )
            .await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        let active = store
            .list_active_execution_for_issue(IssueId::new(42))
            .await
            .unwrap();
        assert_eq!(active.unwrap().id, execution.id);
    }

    #[tokio::test]
    async fn advance_checks_expectations() {
        let store = InMemoryDataGateStore::new();
        let execution = seeded_execution(&store).await;
        let node = execution.current_node().unwrap();

        let stale = ExecutionAdvance {
            execution_id: execution.id,
            expected_status: ExecutionStatus::InProgress,
            expected_position: 2,
            expected_approvals: 0,
            approval: NewApproval {
                node_execution_id: node.id,
                user_id: UserId::new("alice"),
                decision: Decision::Approved,
                comment: String::new(),
            },
            node_updates: Vec::new(),
            flow_status: ExecutionStatus::InProgress,
            new_current_position: Some(1),
            notifications: Vec::new(),
        };
        assert!(matches!(
            store.advance_execution(stale).await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_decision_is_a_conflict() {
        let store = InMemoryDataGateStore::new();
        let execution = seeded_execution(&store).await;
        let node = execution.current_node().unwrap();

        let advance = |approvals: usize| ExecutionAdvance {
            execution_id: execution.id,
            expected_status: ExecutionStatus::InProgress,
            expected_position: 1,
            expected_approvals: approvals,
            approval: NewApproval {
                node_execution_id: node.id,
                user_id: UserId::new("alice"),
                decision: Decision::Approved,
                comment: String::new(),
            },
            node_updates: Vec::new(),
            flow_status: ExecutionStatus::InProgress,
            new_current_position: Some(1),
            notifications: Vec::new(),
        };

        let (approval, _) = store.advance_execution(advance(0)).await.unwrap();
        assert_eq!(approval.decision, Decision::Approved);

        let result = store.advance_execution(advance(1)).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn approval_ids_are_monotonic() {
        let store = InMemoryDataGateStore::new();
        let execution = seeded_execution(&store).await;
        let node = execution.current_node().unwrap();

        let mut last = ApprovalId::new(0);
        for user in ["alice", "bob"] {
            let (approval, _) = store
                .advance_execution(ExecutionAdvance {
                    execution_id: execution.id,
                    expected_status: ExecutionStatus::InProgress,
                    expected_position: 1,
                    expected_approvals: if user == "alice" { 0 } else { 1 },
                    approval: NewApproval {
                        node_execution_id: node.id,
                        user_id: UserId::new(user),
                        decision: Decision::Approved,
                        comment: String::new(),
                    },
                    node_updates: Vec::new(),
                    flow_status: ExecutionStatus::InProgress,
                    new_current_position: Some(1),
                    notifications: Vec::new(),
                })
                .await
                .unwrap();
            assert!(approval.id > last);
            last = approval.id;
        }
    }

    #[tokio::test]
    async fn cancel_terminal_execution_is_a_conflict() {
        let store = InMemoryDataGateStore::new();
        let execution = seeded_execution(&store).await;

        let cancelled = store
            .cancel_execution(execution.id, Vec::new())
            .await
            .unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
        assert_eq!(cancelled.current_position, None);

        let result = store.cancel_execution(execution.id, Vec::new()).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn notification_read_flag_round_trip() {
        let store = InMemoryDataGateStore::new();
        let n = store
            .create_notification(NewNotification {
                kind: datagate_types::NotificationKind::ApprovalRequest,
                title: "approval needed".into(),
                body: String::new(),
                recipient: "alice".into(),
                execution_id: None,
                node_execution_id: None,
                approval_id: None,
            })
            .await
            .unwrap();
        assert!(!n.read);

        let unread = store
            .list_notifications("alice", true, QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);

        store.mark_notification_read(n.id).await.unwrap();
        let unread = store
            .list_notifications("alice", true, QueryWindow::default())
            .await
            .unwrap();
        assert!(unread.is_empty());
    }
}
