//! Flow executions
//!
//! An execution is a running instance of an approval flow attached to a
//! specific issue. It is born on the first gate trigger for the issue and
//! advances through node executions until a terminal status; after that it
//! is immutable.

use crate::{
    ApprovalId, ExecutionId, FlowId, IssueId, NodeExecutionId, NodeId, SensitivityLevel, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Statuses ─────────────────────────────────────────────────────────

/// Lifecycle status of a flow execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal statuses permit no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one node execution within a flow execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeExecutionStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    /// Satisfied without decisions (SELF nodes resolved by the requester)
    Skipped,
}

impl NodeExecutionStatus {
    /// A settled node accepts no further state-changing decisions
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
        }
    }
}

/// A single approver's verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

// ── Approvals ────────────────────────────────────────────────────────

/// One recorded decision on a node execution.
///
/// At most one decision exists per `(node_execution, user)`; ids are
/// monotonic per store and define the total order of decisions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub node_execution_id: NodeExecutionId,
    pub user_id: UserId,
    pub decision: Decision,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

// ── Node Executions ──────────────────────────────────────────────────

/// Runtime state of one flow node within an execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: NodeExecutionId,
    pub execution_id: ExecutionId,
    /// Flow node this execution instantiates
    pub node_id: NodeId,
    /// Mirror of the node's position at execution creation time
    pub position: u32,
    pub status: NodeExecutionStatus,
    /// Decisions recorded against this node, in id order
    pub approvals: Vec<Approval>,
}

impl NodeExecution {
    pub fn approved_count(&self) -> usize {
        self.approvals
            .iter()
            .filter(|a| a.decision == Decision::Approved)
            .count()
    }

    pub fn rejected_count(&self) -> usize {
        self.approvals
            .iter()
            .filter(|a| a.decision == Decision::Rejected)
            .count()
    }

    /// Check whether a user has already recorded a decision here
    pub fn has_decision_from(&self, user: &UserId) -> bool {
        self.approvals.iter().any(|a| &a.user_id == user)
    }
}

// ── Flow Executions ──────────────────────────────────────────────────

/// A running (or finished) instance of an approval flow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowExecution {
    pub id: ExecutionId,
    /// Flow this execution instantiates
    pub flow_id: FlowId,
    /// Issue the gated change belongs to; at most one non-terminal
    /// execution exists per issue
    pub issue_id: IssueId,
    /// Highest sensitivity level detected on the gated change
    pub level: SensitivityLevel,
    pub status: ExecutionStatus,
    /// Position of the node currently in progress; `None` in terminal
    /// states
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_position: Option<u32>,
    /// Node executions ordered by position
    pub node_executions: Vec<NodeExecution>,
    /// Issue creator captured at creation; SELF nodes resolve against it
    pub creator: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowExecution {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Node execution at the given 1-based position
    pub fn node_at(&self, position: u32) -> Option<&NodeExecution> {
        self.node_executions.iter().find(|n| n.position == position)
    }

    /// Node execution currently in progress, if any
    pub fn current_node(&self) -> Option<&NodeExecution> {
        self.current_position.and_then(|p| self.node_at(p))
    }

    /// Highest node position in this execution
    pub fn last_position(&self) -> u32 {
        self.node_executions
            .iter()
            .map(|n| n.position)
            .max()
            .unwrap_or(0)
    }
}
