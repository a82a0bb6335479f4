//! Plan-check gate
//!
//! Entry point for the plan-check subsystem: decides whether a proposed
//! change may run. An issue with an approved execution is admitted; a
//! rejected or cancelled one is denied; anything in flight blocks. A fresh
//! sensitive change classifies against the project's rules, selects a flow,
//! starts an execution, and blocks until it completes.

use crate::authority::AuthorityResolver;
use crate::engine::ExecutionEngine;
use crate::error::{EngineError, EngineResult};
use crate::events::EventSink;
use crate::extract::ChangeExtractor;
use crate::matcher::classify_changes;
use crate::selector::{select_flow, FlowSelection};
use datagate_storage::{
    DataGateStore, FlowFilter, NewChange, QueryWindow, StorageError,
};
use datagate_types::{
    ApprovalFlow, ExecutionId, ExecutionStatus, IssueId, ProjectId, SensitivityLevel, UserId,
};
use std::sync::Arc;
use tracing::info;

/// Gate configuration.
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    /// Materialize built-in default flows when a project has none
    pub use_default_flows: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            use_default_flows: true,
        }
    }
}

/// A plan submitted for checking.
#[derive(Debug, Clone)]
pub struct PlanCheckRequest {
    pub project: ProjectId,
    pub issue_id: IssueId,
    /// Issue creator; captured on the execution for SELF approver nodes
    pub creator: UserId,
    /// The proposed SQL statement
    pub statement: String,
    /// Target database, passed through to the extractor
    pub database: String,
}

/// Gate verdict for a checked plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The change may run
    Admit,
    /// The change must wait for the referenced execution to complete
    Block {
        execution_id: ExecutionId,
        reason: String,
    },
    /// The change must not run
    Deny { reason: String },
}

/// The sensitive-change gate.
pub struct ChangeGate<S, A, E, X> {
    engine: ExecutionEngine<S, A, E>,
    store: Arc<S>,
    extractor: X,
    config: GateConfig,
}

impl<S, A, E, X> ChangeGate<S, A, E, X>
where
    S: DataGateStore,
    A: AuthorityResolver,
    E: EventSink,
    X: ChangeExtractor,
{
    pub fn new(engine: ExecutionEngine<S, A, E>, extractor: X, config: GateConfig) -> Self {
        let store = engine.store().clone();
        Self {
            engine,
            store,
            extractor,
            config,
        }
    }

    pub fn engine(&self) -> &ExecutionEngine<S, A, E> {
        &self.engine
    }

    /// Check a plan and return an admit/block/deny verdict.
    pub async fn check_plan(&self, request: &PlanCheckRequest) -> EngineResult<Verdict> {
        // An issue that has been gated before is judged by its execution.
        if let Some(execution) = self
            .store
            .latest_execution_for_issue(request.issue_id)
            .await?
        {
            return Ok(verdict_for_execution(&execution.status, execution.id));
        }

        let columns = self
            .extractor
            .extract(&request.statement, &request.database)
            .map_err(|e| EngineError::Extractor(e.to_string()))?;

        let rules = self
            .store
            .list_rules(&request.project, QueryWindow::default())
            .await?;
        let enabled: Vec<_> = rules.into_iter().filter(|r| r.enabled).collect();
        let outcome = classify_changes(&enabled, &columns);
        if !outcome.is_sensitive() {
            return Ok(Verdict::Admit);
        }

        let flow = match self.resolve_flow(&request.project, outcome.max_level).await? {
            Some(flow) => flow,
            None => {
                info!(
                    issue_id = %request.issue_id,
                    level = %outcome.max_level,
                    "Sensitive change denied: no approval flow configured"
                );
                return Ok(Verdict::Deny {
                    reason: format!(
                        "no approval flow configured for level {}",
                        outcome.max_level
                    ),
                });
            }
        };

        let execution = match self
            .engine
            .begin_execution(
                request.issue_id,
                flow.id,
                outcome.max_level,
                request.creator.clone(),
            )
            .await
        {
            Ok(execution) => execution,
            // Lost the creation race: the winner's execution gates us.
            Err(EngineError::DuplicateActive(_)) => {
                let winner = self
                    .store
                    .list_active_execution_for_issue(request.issue_id)
                    .await?
                    .ok_or_else(|| {
                        EngineError::Internal(format!(
                            "issue {} has neither a creatable nor an active execution",
                            request.issue_id
                        ))
                    })?;
                return Ok(Verdict::Block {
                    execution_id: winner.id,
                    reason: "approval in progress".to_string(),
                });
            }
            Err(err) => return Err(err),
        };

        let changes: Vec<NewChange> = outcome
            .matches
            .iter()
            .map(|m| NewChange {
                execution_id: Some(execution.id),
                issue_id: request.issue_id,
                table: m.column.table.clone(),
                field: m.column.field.clone(),
                level: m.level,
                rule_id: m.rule_id,
            })
            .collect();
        self.store.record_changes(changes).await?;

        info!(
            issue_id = %request.issue_id,
            execution_id = %execution.id,
            level = %outcome.max_level,
            matches = outcome.matches.len(),
            "Sensitive change blocked pending approval"
        );
        Ok(Verdict::Block {
            execution_id: execution.id,
            reason: "approval required".to_string(),
        })
    }

    /// Find the flow gating `level`, materializing the built-in default
    /// when the project has none and defaults are enabled.
    async fn resolve_flow(
        &self,
        project: &ProjectId,
        level: SensitivityLevel,
    ) -> EngineResult<Option<ApprovalFlow>> {
        let flows = self
            .store
            .list_flows(
                FlowFilter {
                    project: Some(project.clone()),
                    ..FlowFilter::default()
                },
                QueryWindow::default(),
            )
            .await?;

        match select_flow(&flows, project, level, self.config.use_default_flows) {
            FlowSelection::NotRequired => Ok(None),
            FlowSelection::Existing(flow) => Ok(Some(flow)),
            FlowSelection::Missing => Ok(None),
            FlowSelection::BuiltIn(new_flow) => {
                match self.store.create_flow(new_flow).await {
                    Ok(flow) => {
                        info!(
                            project = %project,
                            flow_id = %flow.id,
                            level = %level,
                            "Materialized built-in approval flow"
                        );
                        Ok(Some(flow))
                    }
                    // A concurrent gate call materialized it first.
                    Err(StorageError::Conflict(_)) => {
                        let flows = self
                            .store
                            .list_flows(
                                FlowFilter {
                                    project: Some(project.clone()),
                                    enabled: Some(true),
                                    ..FlowFilter::default()
                                },
                                QueryWindow::default(),
                            )
                            .await?;
                        match select_flow(&flows, project, level, false) {
                            FlowSelection::Existing(flow) => Ok(Some(flow)),
                            _ => Ok(None),
                        }
                    }
                    Err(err) => Err(EngineError::Storage(err)),
                }
            }
        }
    }
}

fn verdict_for_execution(status: &ExecutionStatus, execution_id: ExecutionId) -> Verdict {
    match status {
        ExecutionStatus::Approved => Verdict::Admit,
        ExecutionStatus::Rejected => Verdict::Deny {
            reason: "sensitive change was rejected".to_string(),
        },
        ExecutionStatus::Cancelled => Verdict::Deny {
            reason: "approval flow was cancelled".to_string(),
        },
        ExecutionStatus::Pending | ExecutionStatus::InProgress => Verdict::Block {
            execution_id,
            reason: "approval in progress".to_string(),
        },
    }
}
