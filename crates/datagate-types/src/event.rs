//! Domain events
//!
//! Events describe execution state transitions for downstream consumers
//! (audit trails, delivery fan-out, dashboards). They are emitted after the
//! owning storage transaction commits and are fire-and-forget: a lost event
//! never implies a lost state transition, because notifications are
//! enqueued durably inside the transaction itself.

use crate::{ExecutionId, IssueId, NodeExecutionId, SensitivityLevel, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An execution state transition observed by the engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalEvent {
    /// A node became current; the listed approvers are expected to decide
    ApprovalRequested {
        execution_id: ExecutionId,
        node_execution_id: NodeExecutionId,
        position: u32,
        approvers: Vec<String>,
    },
    /// An approver approved the current node
    ApprovalApproved {
        execution_id: ExecutionId,
        node_execution_id: NodeExecutionId,
        position: u32,
        approver: UserId,
    },
    /// An approver rejected the current node
    ApprovalRejected {
        execution_id: ExecutionId,
        node_execution_id: NodeExecutionId,
        position: u32,
        approver: UserId,
    },
    /// The execution reached approved or rejected
    FlowCompleted {
        execution_id: ExecutionId,
        issue_id: IssueId,
        is_approved: bool,
    },
    /// The execution was cancelled by its creator or a project admin
    FlowCancelled {
        execution_id: ExecutionId,
        issue_id: IssueId,
        cancelled_by: UserId,
        reason: String,
    },
    /// Reminder for a node still awaiting decisions
    NodeReminder {
        execution_id: ExecutionId,
        node_execution_id: NodeExecutionId,
        position: u32,
        approvers: Vec<String>,
    },
}

/// Envelope pairing an event with its emission context
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEventEnvelope {
    pub event: ApprovalEvent,
    /// Sensitivity level of the execution the event belongs to
    pub level: SensitivityLevel,
    pub emitted_at: DateTime<Utc>,
}
