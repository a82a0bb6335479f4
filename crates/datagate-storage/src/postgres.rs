//! PostgreSQL adapter for DataGate storage.
//!
//! This adapter is the transactional source-of-truth backend. Invariants
//! that the engine relies on are enforced in the schema itself:
//! - at most one non-terminal execution per issue (partial unique index)
//! - at most one enabled flow per `(project, level)` (partial unique index)
//! - at most one decision per `(node_execution, user)` (unique constraint)
//!
//! Compound execution writes take `SELECT ... FOR UPDATE` on the execution
//! row, re-check the caller's expectations, and surface a mismatch as
//! [`StorageError::Conflict`].

use crate::traits::{
    ChangeStore, ExecutionAdvance, ExecutionFilter, ExecutionStore, FlowFilter, FlowPatch,
    FlowStore, NewApproval, NewChange, NewExecution, NewFlow, NewNode, NewNotification, NewRule,
    NotificationStore, QueryWindow, RulePatch, RuleStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use datagate_types::{
    Approval, ApprovalFlow, ApprovalId, ApprovalNode, ApprovalType, ApproverType, Decision,
    ExecutionId, ExecutionStatus, FieldPattern, FlowExecution, FlowId, IssueId, NodeExecution,
    NodeExecutionId, NodeExecutionStatus, NodeId, Notification, NotificationId, NotificationKind,
    ProjectId, RuleId, SensitiveDataChange, SensitiveDataRule, SensitivityLevel, UserId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

/// PostgreSQL-backed DataGate storage adapter.
#[derive(Clone)]
pub struct PostgresDataGateStore {
    pool: PgPool,
}

impl PostgresDataGateStore {
    /// Connect to PostgreSQL and initialize the required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS sensitive_data_rule (
                id BIGSERIAL PRIMARY KEY,
                project TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                level TEXT NOT NULL,
                enabled BOOLEAN NOT NULL,
                table_pattern TEXT NOT NULL DEFAULT '',
                field_patterns JSONB NOT NULL DEFAULT '[]',
                creator TEXT NOT NULL,
                updater TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (project, title)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS approval_flow (
                id BIGSERIAL PRIMARY KEY,
                project TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                level TEXT NOT NULL,
                enabled BOOLEAN NOT NULL,
                creator TEXT NOT NULL,
                updater TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (project, title)
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS approval_flow_enabled_level
                ON approval_flow (project, level) WHERE enabled
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS approval_node (
                id BIGSERIAL PRIMARY KEY,
                flow_id BIGINT NOT NULL REFERENCES approval_flow (id) ON DELETE CASCADE,
                position INT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                approver_type TEXT NOT NULL,
                approver_ids JSONB NOT NULL DEFAULT '[]',
                approval_type TEXT NOT NULL,
                UNIQUE (flow_id, position)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS approval_flow_execution (
                id BIGSERIAL PRIMARY KEY,
                flow_id BIGINT NOT NULL REFERENCES approval_flow (id),
                issue_id BIGINT NOT NULL,
                level TEXT NOT NULL,
                status TEXT NOT NULL,
                current_position INT,
                creator TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS approval_flow_execution_active_issue
                ON approval_flow_execution (issue_id)
                WHERE status IN ('pending', 'in_progress')
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS approval_node_execution (
                id BIGSERIAL PRIMARY KEY,
                execution_id BIGINT NOT NULL REFERENCES approval_flow_execution (id) ON DELETE CASCADE,
                node_id BIGINT NOT NULL,
                position INT NOT NULL,
                status TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS approval (
                id BIGSERIAL PRIMARY KEY,
                node_execution_id BIGINT NOT NULL REFERENCES approval_node_execution (id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                decision TEXT NOT NULL,
                comment TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (node_execution_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sensitive_data_change (
                id BIGSERIAL PRIMARY KEY,
                execution_id BIGINT,
                issue_id BIGINT NOT NULL,
                table_name TEXT NOT NULL,
                field_name TEXT NOT NULL,
                level TEXT NOT NULL,
                rule_id BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notification (
                id BIGSERIAL PRIMARY KEY,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL DEFAULT '',
                recipient TEXT NOT NULL,
                execution_id BIGINT,
                node_execution_id BIGINT,
                approval_id BIGINT,
                read BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn flow_nodes(&self, flow_id: FlowId) -> StorageResult<Vec<ApprovalNode>> {
        let rows = sqlx::query(
            r#"
            SELECT id, flow_id, position, title, description, approver_type, approver_ids, approval_type
              FROM approval_node
             WHERE flow_id = $1
             ORDER BY position
            "#,
        )
        .bind(flow_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(node_row_to_record).collect()
    }

    async fn hydrate_execution(&self, row: PgRow) -> StorageResult<FlowExecution> {
        let mut execution = execution_row_to_record(row)?;
        let node_rows = sqlx::query(
            r#"
            SELECT id, execution_id, node_id, position, status
              FROM approval_node_execution
             WHERE execution_id = $1
             ORDER BY position
            "#,
        )
        .bind(execution.id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut nodes = node_rows
            .into_iter()
            .map(node_execution_row_to_record)
            .collect::<StorageResult<Vec<NodeExecution>>>()?;

        for node in &mut nodes {
            let approval_rows = sqlx::query(
                r#"
                SELECT id, node_execution_id, user_id, decision, comment, created_at
                  FROM approval
                 WHERE node_execution_id = $1
                 ORDER BY id
                "#,
            )
            .bind(node.id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
            node.approvals = approval_rows
                .into_iter()
                .map(approval_row_to_record)
                .collect::<StorageResult<Vec<Approval>>>()?;
        }

        execution.node_executions = nodes;
        Ok(execution)
    }

    async fn get_hydrated_flow(&self, id: FlowId) -> StorageResult<Option<ApprovalFlow>> {
        let row = sqlx::query(
            r#"
            SELECT id, project, title, description, level, enabled, creator, updater, created_at, updated_at
              FROM approval_flow
             WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut flow = flow_row_to_record(row)?;
        flow.nodes = self.flow_nodes(id).await?;
        Ok(Some(flow))
    }
}

#[async_trait]
impl RuleStore for PostgresDataGateStore {
    async fn create_rule(&self, rule: NewRule) -> StorageResult<SensitiveDataRule> {
        let patterns = serde_json::to_value(&rule.field_patterns)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            INSERT INTO sensitive_data_rule
                (project, title, description, level, enabled, table_pattern, field_patterns, creator, updater, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, $9)
            RETURNING id, project, title, description, level, enabled, table_pattern, field_patterns, creator, updater, created_at, updated_at
            "#,
        )
        .bind(rule.project.as_str())
        .bind(&rule.title)
        .bind(&rule.description)
        .bind(rule.level.as_str())
        .bind(rule.enabled)
        .bind(&rule.table_pattern)
        .bind(patterns)
        .bind(rule.creator.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        rule_row_to_record(row)
    }

    async fn get_rule(&self, id: RuleId) -> StorageResult<Option<SensitiveDataRule>> {
        let row = sqlx::query(
            r#"
            SELECT id, project, title, description, level, enabled, table_pattern, field_patterns, creator, updater, created_at, updated_at
              FROM sensitive_data_rule
             WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(rule_row_to_record).transpose()
    }

    async fn list_rules(
        &self,
        project: &ProjectId,
        window: QueryWindow,
    ) -> StorageResult<Vec<SensitiveDataRule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project, title, description, level, enabled, table_pattern, field_patterns, creator, updater, created_at, updated_at
              FROM sensitive_data_rule
             WHERE project = $1
             ORDER BY id DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(project.as_str())
        .bind(window_limit(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(rule_row_to_record).collect()
    }

    async fn update_rule(&self, id: RuleId, patch: RulePatch) -> StorageResult<SensitiveDataRule> {
        let patterns = patch
            .field_patterns
            .as_ref()
            .map(|p| serde_json::to_value(p).map_err(|e| StorageError::Serialization(e.to_string())))
            .transpose()?;

        let row = sqlx::query(
            r#"
            UPDATE sensitive_data_rule
               SET title = COALESCE($1, title),
                   description = COALESCE($2, description),
                   level = COALESCE($3, level),
                   enabled = COALESCE($4, enabled),
                   table_pattern = COALESCE($5, table_pattern),
                   field_patterns = COALESCE($6, field_patterns),
                   updater = $7,
                   updated_at = $8
             WHERE id = $9
            RETURNING id, project, title, description, level, enabled, table_pattern, field_patterns, creator, updater, created_at, updated_at
            "#,
        )
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.level.map(|l| l.as_str()))
        .bind(patch.enabled)
        .bind(patch.table_pattern)
        .bind(patterns)
        .bind(patch.updater.as_str())
        .bind(Utc::now())
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        row.map(rule_row_to_record)
            .transpose()?
            .ok_or_else(|| StorageError::NotFound(format!("rule {id} not found")))
    }

    async fn delete_rule(&self, id: RuleId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM sensitive_data_rule WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("rule {id} not found")));
        }
        Ok(())
    }
}

async fn insert_nodes(
    tx: &mut Transaction<'_, Postgres>,
    flow_id: FlowId,
    nodes: &[NewNode],
) -> StorageResult<()> {
    for node in nodes {
        let approvers = serde_json::to_value(&node.approver_ids)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO approval_node
                (flow_id, position, title, description, approver_type, approver_ids, approval_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(flow_id.0)
        .bind(node.position as i32)
        .bind(&node.title)
        .bind(&node.description)
        .bind(node.approver_type.as_str())
        .bind(approvers)
        .bind(node.approval_type.as_str())
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_conflict)?;
    }
    Ok(())
}

#[async_trait]
impl FlowStore for PostgresDataGateStore {
    async fn create_flow(&self, flow: NewFlow) -> StorageResult<ApprovalFlow> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            INSERT INTO approval_flow
                (project, title, description, level, enabled, creator, updater, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $7)
            RETURNING id
            "#,
        )
        .bind(flow.project.as_str())
        .bind(&flow.title)
        .bind(&flow.description)
        .bind(flow.level.as_str())
        .bind(flow.enabled)
        .bind(flow.creator.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;

        let flow_id = FlowId::new(
            row.try_get::<i64, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        );
        insert_nodes(&mut tx, flow_id, &flow.nodes).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        self.get_hydrated_flow(flow_id)
            .await?
            .ok_or_else(|| StorageError::Backend("created flow disappeared".to_string()))
    }

    async fn get_flow(&self, id: FlowId) -> StorageResult<Option<ApprovalFlow>> {
        self.get_hydrated_flow(id).await
    }

    async fn list_flows(
        &self,
        filter: FlowFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<ApprovalFlow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project, title, description, level, enabled, creator, updater, created_at, updated_at
              FROM approval_flow
             WHERE ($1::TEXT IS NULL OR project = $1)
               AND ($2::TEXT IS NULL OR level = $2)
               AND ($3::BOOLEAN IS NULL OR enabled = $3)
             ORDER BY id DESC
             LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.project.as_ref().map(|p| p.as_str().to_string()))
        .bind(filter.level.map(|l| l.as_str()))
        .bind(filter.enabled)
        .bind(window_limit(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut flows = Vec::with_capacity(rows.len());
        for row in rows {
            let mut flow = flow_row_to_record(row)?;
            flow.nodes = self.flow_nodes(flow.id).await?;
            flows.push(flow);
        }
        Ok(flows)
    }

    async fn update_flow(&self, id: FlowId, patch: FlowPatch) -> StorageResult<ApprovalFlow> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(
            r#"
            UPDATE approval_flow
               SET title = COALESCE($1, title),
                   description = COALESCE($2, description),
                   level = COALESCE($3, level),
                   enabled = COALESCE($4, enabled),
                   updater = $5,
                   updated_at = $6
             WHERE id = $7
            RETURNING id
            "#,
        )
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.level.map(|l| l.as_str()))
        .bind(patch.enabled)
        .bind(patch.updater.as_str())
        .bind(Utc::now())
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;

        if row.is_none() {
            return Err(StorageError::NotFound(format!("flow {id} not found")));
        }

        if let Some(nodes) = &patch.nodes {
            sqlx::query("DELETE FROM approval_node WHERE flow_id = $1")
                .bind(id.0)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            insert_nodes(&mut tx, id, nodes).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        self.get_hydrated_flow(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("flow {id} not found")))
    }

    async fn delete_flow(&self, id: FlowId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM approval_flow WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("flow {id} not found")));
        }
        Ok(())
    }
}

async fn insert_notifications(
    tx: &mut Transaction<'_, Postgres>,
    notifications: &[NewNotification],
) -> StorageResult<()> {
    for n in notifications {
        sqlx::query(
            r#"
            INSERT INTO notification
                (kind, title, body, recipient, execution_id, node_execution_id, approval_id, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8)
            "#,
        )
        .bind(n.kind.as_str())
        .bind(&n.title)
        .bind(&n.body)
        .bind(&n.recipient)
        .bind(n.execution_id.map(|id| id.0))
        .bind(n.node_execution_id.map(|id| id.0))
        .bind(n.approval_id.map(|id| id.0))
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    }
    Ok(())
}

#[async_trait]
impl ExecutionStore for PostgresDataGateStore {
    async fn insert_execution_with_nodes(
        &self,
        execution: NewExecution,
        flow: &ApprovalFlow,
    ) -> StorageResult<FlowExecution> {
        let mut nodes: Vec<&ApprovalNode> = flow.nodes.iter().collect();
        nodes.sort_by_key(|n| n.position);
        let first_position = nodes
            .first()
            .map(|n| n.position)
            .ok_or_else(|| StorageError::InvalidInput("flow has no nodes".to_string()))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            INSERT INTO approval_flow_execution
                (flow_id, issue_id, level, status, current_position, creator, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING id
            "#,
        )
        .bind(execution.flow_id.0)
        .bind(execution.issue_id.0)
        .bind(execution.level.as_str())
        .bind(ExecutionStatus::InProgress.as_str())
        .bind(first_position as i32)
        .bind(execution.creator.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;

        let execution_id: i64 = row
            .try_get("id")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        for node in &nodes {
            let status = if node.position == first_position {
                NodeExecutionStatus::InProgress
            } else {
                NodeExecutionStatus::Pending
            };
            sqlx::query(
                r#"
                INSERT INTO approval_node_execution (execution_id, node_id, position, status)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(execution_id)
            .bind(node.id.0)
            .bind(node.position as i32)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        self.get_execution(ExecutionId::new(execution_id))
            .await?
            .ok_or_else(|| StorageError::Backend("created execution disappeared".to_string()))
    }

    async fn get_execution(&self, id: ExecutionId) -> StorageResult<Option<FlowExecution>> {
        let row = sqlx::query(
            r#"
            SELECT id, flow_id, issue_id, level, status, current_position, creator, created_at, updated_at
              FROM approval_flow_execution
             WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(self.hydrate_execution(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        filter: ExecutionFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<FlowExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT id, flow_id, issue_id, level, status, current_position, creator, created_at, updated_at
              FROM approval_flow_execution
             WHERE ($1::BIGINT IS NULL OR flow_id = $1)
               AND ($2::BIGINT IS NULL OR issue_id = $2)
               AND ($3::TEXT IS NULL OR level = $3)
               AND ($4::TEXT IS NULL OR status = $4)
             ORDER BY id DESC
             LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.flow_id.map(|id| id.0))
        .bind(filter.issue_id.map(|id| id.0))
        .bind(filter.level.map(|l| l.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(window_limit(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut executions = Vec::with_capacity(rows.len());
        for row in rows {
            executions.push(self.hydrate_execution(row).await?);
        }
        Ok(executions)
    }

    async fn list_active_execution_for_issue(
        &self,
        issue: IssueId,
    ) -> StorageResult<Option<FlowExecution>> {
        let row = sqlx::query(
            r#"
            SELECT id, flow_id, issue_id, level, status, current_position, creator, created_at, updated_at
              FROM approval_flow_execution
             WHERE issue_id = $1 AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(issue.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(self.hydrate_execution(row).await?)),
            None => Ok(None),
        }
    }

    async fn latest_execution_for_issue(
        &self,
        issue: IssueId,
    ) -> StorageResult<Option<FlowExecution>> {
        let row = sqlx::query(
            r#"
            SELECT id, flow_id, issue_id, level, status, current_position, creator, created_at, updated_at
              FROM approval_flow_execution
             WHERE issue_id = $1
             ORDER BY id DESC
             LIMIT 1
            "#,
        )
        .bind(issue.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(self.hydrate_execution(row).await?)),
            None => Ok(None),
        }
    }

    async fn advance_execution(
        &self,
        advance: ExecutionAdvance,
    ) -> StorageResult<(Approval, FlowExecution)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        // Execution-scoped lock: contending decisions queue here.
        let row = sqlx::query(
            r#"
            SELECT status, current_position
              FROM approval_flow_execution
             WHERE id = $1
               FOR UPDATE
            "#,
        )
        .bind(advance.execution_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| {
            StorageError::NotFound(format!("execution {} not found", advance.execution_id))
        })?;

        let status: String = row
            .try_get("status")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let current_position: Option<i32> = row
            .try_get("current_position")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if status != advance.expected_status.as_str()
            || current_position != Some(advance.expected_position as i32)
        {
            return Err(StorageError::Conflict(
                "execution changed concurrently".to_string(),
            ));
        }

        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS approvals FROM approval WHERE node_execution_id = $1",
        )
        .bind(advance.approval.node_execution_id.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .try_get("approvals")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if count as usize != advance.expected_approvals {
            return Err(StorageError::Conflict(
                "node approvals changed concurrently".to_string(),
            ));
        }

        let approval_row = sqlx::query(
            r#"
            INSERT INTO approval (node_execution_id, user_id, decision, comment, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, node_execution_id, user_id, decision, comment, created_at
            "#,
        )
        .bind(advance.approval.node_execution_id.0)
        .bind(advance.approval.user_id.as_str())
        .bind(advance.approval.decision.as_str())
        .bind(&advance.approval.comment)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;
        let approval = approval_row_to_record(approval_row)?;

        for update in &advance.node_updates {
            sqlx::query("UPDATE approval_node_execution SET status = $1 WHERE id = $2")
                .bind(update.status.as_str())
                .bind(update.node_execution_id.0)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }

        sqlx::query(
            r#"
            UPDATE approval_flow_execution
               SET status = $1, current_position = $2, updated_at = $3
             WHERE id = $4
            "#,
        )
        .bind(advance.flow_status.as_str())
        .bind(advance.new_current_position.map(|p| p as i32))
        .bind(Utc::now())
        .bind(advance.execution_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        insert_notifications(&mut tx, &advance.notifications).await?;
        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let execution = self
            .get_execution(advance.execution_id)
            .await?
            .ok_or_else(|| StorageError::Backend("advanced execution disappeared".to_string()))?;
        Ok((approval, execution))
    }

    async fn insert_approval(&self, approval: NewApproval) -> StorageResult<Approval> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(
            r#"
            SELECT e.status
              FROM approval_node_execution ne
              JOIN approval_flow_execution e ON e.id = ne.execution_id
             WHERE ne.id = $1
               FOR UPDATE OF e
            "#,
        )
        .bind(approval.node_execution_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| {
            StorageError::NotFound(format!(
                "node execution {} not found",
                approval.node_execution_id
            ))
        })?;

        let status: String = row
            .try_get("status")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let status = parse_execution_status(&status)?;
        if status.is_terminal() {
            return Err(StorageError::InvariantViolation(
                "execution is terminal".to_string(),
            ));
        }

        let approval_row = sqlx::query(
            r#"
            INSERT INTO approval (node_execution_id, user_id, decision, comment, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, node_execution_id, user_id, decision, comment, created_at
            "#,
        )
        .bind(approval.node_execution_id.0)
        .bind(approval.user_id.as_str())
        .bind(approval.decision.as_str())
        .bind(&approval.comment)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        approval_row_to_record(approval_row)
    }

    async fn cancel_execution(
        &self,
        id: ExecutionId,
        notifications: Vec<NewNotification>,
    ) -> StorageResult<FlowExecution> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(
            "SELECT status FROM approval_flow_execution WHERE id = $1 FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(format!("execution {id} not found")))?;

        let status: String = row
            .try_get("status")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if parse_execution_status(&status)?.is_terminal() {
            return Err(StorageError::Conflict(format!(
                "execution {id} is already terminal"
            )));
        }

        sqlx::query(
            r#"
            UPDATE approval_flow_execution
               SET status = $1, current_position = NULL, updated_at = $2
             WHERE id = $3
            "#,
        )
        .bind(ExecutionStatus::Cancelled.as_str())
        .bind(Utc::now())
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        insert_notifications(&mut tx, &notifications).await?;
        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        self.get_execution(id)
            .await?
            .ok_or_else(|| StorageError::Backend("cancelled execution disappeared".to_string()))
    }
}

#[async_trait]
impl ChangeStore for PostgresDataGateStore {
    async fn record_changes(&self, changes: Vec<NewChange>) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let now = Utc::now();
        for change in &changes {
            sqlx::query(
                r#"
                INSERT INTO sensitive_data_change
                    (execution_id, issue_id, table_name, field_name, level, rule_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(change.execution_id.map(|id| id.0))
            .bind(change.issue_id.0)
            .bind(&change.table)
            .bind(&change.field)
            .bind(change.level.as_str())
            .bind(change.rule_id.0)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn list_changes_for_issue(
        &self,
        issue: IssueId,
    ) -> StorageResult<Vec<SensitiveDataChange>> {
        let rows = sqlx::query(
            r#"
            SELECT execution_id, issue_id, table_name, field_name, level, rule_id, created_at
              FROM sensitive_data_change
             WHERE issue_id = $1
             ORDER BY id
            "#,
        )
        .bind(issue.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(change_row_to_record).collect()
    }
}

#[async_trait]
impl NotificationStore for PostgresDataGateStore {
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> StorageResult<Notification> {
        let row = sqlx::query(
            r#"
            INSERT INTO notification
                (kind, title, body, recipient, execution_id, node_execution_id, approval_id, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8)
            RETURNING id, kind, title, body, recipient, execution_id, node_execution_id, approval_id, read, created_at
            "#,
        )
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.recipient)
        .bind(notification.execution_id.map(|id| id.0))
        .bind(notification.node_execution_id.map(|id| id.0))
        .bind(notification.approval_id.map(|id| id.0))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        notification_row_to_record(row)
    }

    async fn list_notifications(
        &self,
        recipient: &str,
        unread_only: bool,
        window: QueryWindow,
    ) -> StorageResult<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, title, body, recipient, execution_id, node_execution_id, approval_id, read, created_at
              FROM notification
             WHERE recipient = $1 AND (NOT $2 OR NOT read)
             ORDER BY id DESC
             LIMIT $3 OFFSET $4
            "#,
        )
        .bind(recipient)
        .bind(unread_only)
        .bind(window_limit(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(notification_row_to_record).collect()
    }

    async fn mark_notification_read(&self, id: NotificationId) -> StorageResult<Notification> {
        let row = sqlx::query(
            r#"
            UPDATE notification
               SET read = TRUE
             WHERE id = $1
            RETURNING id, kind, title, body, recipient, execution_id, node_execution_id, approval_id, read, created_at
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(format!("notification {id} not found")))?;

        notification_row_to_record(row)
    }

    async fn delete_notification(&self, id: NotificationId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM notification WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "notification {id} not found"
            )));
        }
        Ok(())
    }
}

// ── Row mapping ──────────────────────────────────────────────────────

fn rule_row_to_record(row: PgRow) -> StorageResult<SensitiveDataRule> {
    let patterns_json: serde_json::Value = row
        .try_get("field_patterns")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let field_patterns: Vec<FieldPattern> = serde_json::from_value(patterns_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let level: String = row
        .try_get("level")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(SensitiveDataRule {
        id: RuleId::new(
            row.try_get("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        project: ProjectId::new(
            row.try_get::<String, _>("project")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        title: row
            .try_get("title")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        level: parse_level(&level)?,
        enabled: row
            .try_get("enabled")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        table_pattern: row
            .try_get("table_pattern")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        field_patterns,
        creator: UserId::new(
            row.try_get::<String, _>("creator")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        updater: UserId::new(
            row.try_get::<String, _>("updater")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn flow_row_to_record(row: PgRow) -> StorageResult<ApprovalFlow> {
    let level: String = row
        .try_get("level")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(ApprovalFlow {
        id: FlowId::new(
            row.try_get("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        project: ProjectId::new(
            row.try_get::<String, _>("project")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        title: row
            .try_get("title")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        level: parse_level(&level)?,
        enabled: row
            .try_get("enabled")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        nodes: Vec::new(),
        creator: UserId::new(
            row.try_get::<String, _>("creator")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        updater: UserId::new(
            row.try_get::<String, _>("updater")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn node_row_to_record(row: PgRow) -> StorageResult<ApprovalNode> {
    let approvers_json: serde_json::Value = row
        .try_get("approver_ids")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let approver_ids: Vec<String> = serde_json::from_value(approvers_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let approver_type: String = row
        .try_get("approver_type")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let approval_type: String = row
        .try_get("approval_type")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(ApprovalNode {
        id: NodeId::new(
            row.try_get("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        flow_id: FlowId::new(
            row.try_get("flow_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        position: row
            .try_get::<i32, _>("position")
            .map_err(|e| StorageError::Backend(e.to_string()))? as u32,
        title: row
            .try_get("title")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        approver_type: parse_approver_type(&approver_type)?,
        approver_ids,
        approval_type: parse_approval_type(&approval_type)?,
    })
}

fn execution_row_to_record(row: PgRow) -> StorageResult<FlowExecution> {
    let level: String = row
        .try_get("level")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let current_position: Option<i32> = row
        .try_get("current_position")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(FlowExecution {
        id: ExecutionId::new(
            row.try_get("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        flow_id: FlowId::new(
            row.try_get("flow_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        issue_id: IssueId::new(
            row.try_get("issue_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        level: parse_level(&level)?,
        status: parse_execution_status(&status)?,
        current_position: current_position.map(|p| p as u32),
        node_executions: Vec::new(),
        creator: UserId::new(
            row.try_get::<String, _>("creator")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn node_execution_row_to_record(row: PgRow) -> StorageResult<NodeExecution> {
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(NodeExecution {
        id: NodeExecutionId::new(
            row.try_get("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        execution_id: ExecutionId::new(
            row.try_get("execution_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        node_id: NodeId::new(
            row.try_get("node_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        position: row
            .try_get::<i32, _>("position")
            .map_err(|e| StorageError::Backend(e.to_string()))? as u32,
        status: parse_node_status(&status)?,
        approvals: Vec::new(),
    })
}

fn approval_row_to_record(row: PgRow) -> StorageResult<Approval> {
    let decision: String = row
        .try_get("decision")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(Approval {
        id: ApprovalId::new(
            row.try_get("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        node_execution_id: NodeExecutionId::new(
            row.try_get("node_execution_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        user_id: UserId::new(
            row.try_get::<String, _>("user_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        decision: parse_decision(&decision)?,
        comment: row
            .try_get("comment")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn change_row_to_record(row: PgRow) -> StorageResult<SensitiveDataChange> {
    let level: String = row
        .try_get("level")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let execution_id: Option<i64> = row
        .try_get("execution_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(SensitiveDataChange {
        execution_id: execution_id.map(ExecutionId::new),
        issue_id: IssueId::new(
            row.try_get("issue_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        table: row
            .try_get("table_name")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        field: row
            .try_get("field_name")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        level: parse_level(&level)?,
        rule_id: RuleId::new(
            row.try_get("rule_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn notification_row_to_record(row: PgRow) -> StorageResult<Notification> {
    let kind: String = row
        .try_get("kind")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let execution_id: Option<i64> = row
        .try_get("execution_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let node_execution_id: Option<i64> = row
        .try_get("node_execution_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let approval_id: Option<i64> = row
        .try_get("approval_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Notification {
        id: NotificationId::new(
            row.try_get("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        kind: parse_notification_kind(&kind)?,
        title: row
            .try_get("title")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        body: row
            .try_get("body")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        recipient: row
            .try_get("recipient")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        execution_id: execution_id.map(ExecutionId::new),
        node_execution_id: node_execution_id.map(NodeExecutionId::new),
        approval_id: approval_id.map(ApprovalId::new),
        read: row
            .try_get("read")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

// ── Enum mapping ─────────────────────────────────────────────────────

fn parse_level(raw: &str) -> StorageResult<SensitivityLevel> {
    match raw {
        "unspecified" => Ok(SensitivityLevel::Unspecified),
        "low" => Ok(SensitivityLevel::Low),
        "medium" => Ok(SensitivityLevel::Medium),
        "high" => Ok(SensitivityLevel::High),
        _ => Err(StorageError::Serialization(format!(
            "unknown sensitivity level `{raw}`"
        ))),
    }
}

fn parse_execution_status(raw: &str) -> StorageResult<ExecutionStatus> {
    match raw {
        "pending" => Ok(ExecutionStatus::Pending),
        "in_progress" => Ok(ExecutionStatus::InProgress),
        "approved" => Ok(ExecutionStatus::Approved),
        "rejected" => Ok(ExecutionStatus::Rejected),
        "cancelled" => Ok(ExecutionStatus::Cancelled),
        _ => Err(StorageError::Serialization(format!(
            "unknown execution status `{raw}`"
        ))),
    }
}

fn parse_node_status(raw: &str) -> StorageResult<NodeExecutionStatus> {
    match raw {
        "pending" => Ok(NodeExecutionStatus::Pending),
        "in_progress" => Ok(NodeExecutionStatus::InProgress),
        "approved" => Ok(NodeExecutionStatus::Approved),
        "rejected" => Ok(NodeExecutionStatus::Rejected),
        "skipped" => Ok(NodeExecutionStatus::Skipped),
        _ => Err(StorageError::Serialization(format!(
            "unknown node execution status `{raw}`"
        ))),
    }
}

fn parse_approver_type(raw: &str) -> StorageResult<ApproverType> {
    match raw {
        "user" => Ok(ApproverType::User),
        "group" => Ok(ApproverType::Group),
        "role" => Ok(ApproverType::Role),
        "self" => Ok(ApproverType::SelfApprover),
        _ => Err(StorageError::Serialization(format!(
            "unknown approver type `{raw}`"
        ))),
    }
}

fn parse_approval_type(raw: &str) -> StorageResult<ApprovalType> {
    match raw {
        "all" => Ok(ApprovalType::All),
        "any" => Ok(ApprovalType::Any),
        _ => Err(StorageError::Serialization(format!(
            "unknown approval type `{raw}`"
        ))),
    }
}

fn parse_decision(raw: &str) -> StorageResult<Decision> {
    match raw {
        "approved" => Ok(Decision::Approved),
        "rejected" => Ok(Decision::Rejected),
        _ => Err(StorageError::Serialization(format!(
            "unknown decision `{raw}`"
        ))),
    }
}

fn parse_notification_kind(raw: &str) -> StorageResult<NotificationKind> {
    match raw {
        "approval_request" => Ok(NotificationKind::ApprovalRequest),
        "approval_result" => Ok(NotificationKind::ApprovalResult),
        "approval_flow_complete" => Ok(NotificationKind::ApprovalFlowComplete),
        "approval_node_reminder" => Ok(NotificationKind::ApprovalNodeReminder),
        _ => Err(StorageError::Serialization(format!(
            "unknown notification kind `{raw}`"
        ))),
    }
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}

fn window_limit(window: QueryWindow) -> StorageResult<i64> {
    if window.limit == 0 {
        Ok(i64::MAX)
    } else {
        to_i64(window.limit)
    }
}
