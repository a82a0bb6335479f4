//! Notification records
//!
//! One record is enqueued per recipient of a domain event, inside the same
//! storage transaction as the state transition it describes. Delivery
//! beyond persistence (email, IM) is a collaborator concern; the only
//! mutable field after creation is the `read` flag.

use crate::{ApprovalId, ExecutionId, NodeExecutionId, NotificationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of outbound notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A node became current and awaits the recipient's decision
    ApprovalRequest,
    /// A decision was recorded on a node the recipient is involved in
    ApprovalResult,
    /// The flow reached a terminal state
    ApprovalFlowComplete,
    /// Reminder for a node that is still awaiting the recipient
    ApprovalNodeReminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApprovalRequest => "approval_request",
            Self::ApprovalResult => "approval_result",
            Self::ApprovalFlowComplete => "approval_flow_complete",
            Self::ApprovalNodeReminder => "approval_node_reminder",
        }
    }
}

/// A stored outbound notification
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Recipient key: a user id, group id, or role name, depending on the
    /// approver specification that produced it
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_execution_id: Option<NodeExecutionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<ApprovalId>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
