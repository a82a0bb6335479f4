//! Approval flows and their nodes
//!
//! A flow is an ordered, non-empty list of approval nodes tagged with a
//! sensitivity level. At most one enabled flow exists per `(project, level)`
//! pair. Node positions are 1-based and contiguous; executions walk them
//! strictly in order.

use crate::{FlowId, NodeId, ProjectId, SensitivityLevel, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Approver Specification ───────────────────────────────────────────

/// Who a node's approver list refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverType {
    /// `approver_ids` are user ids
    User,
    /// `approver_ids` are group ids resolved by the authority collaborator
    Group,
    /// `approver_ids` are role names resolved by the authority collaborator
    Role,
    /// Resolves to the execution's issue creator; `approver_ids` is empty
    SelfApprover,
}

impl ApproverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Role => "role",
            Self::SelfApprover => "self",
        }
    }
}

/// Per-node quorum rule
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    /// Every listed approver must approve
    All,
    /// A single approval settles the node
    Any,
}

impl ApprovalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
        }
    }
}

// ── Nodes ────────────────────────────────────────────────────────────

/// One step of an approval flow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalNode {
    /// Storage-assigned identifier
    pub id: NodeId,
    /// Owning flow
    pub flow_id: FlowId,
    /// 1-based position, unique and contiguous per flow
    pub position: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub approver_type: ApproverType,
    /// Non-empty unless `approver_type` is `SelfApprover`
    #[serde(default)]
    pub approver_ids: Vec<String>,
    pub approval_type: ApprovalType,
}

impl ApprovalNode {
    /// Number of approvals needed to settle this node.
    ///
    /// Derived from the quorum rule: ALL requires every listed approver
    /// (one for SELF nodes), ANY requires exactly one.
    pub fn required_approvals(&self) -> usize {
        match self.approval_type {
            ApprovalType::All => match self.approver_type {
                ApproverType::SelfApprover => 1,
                _ => self.approver_ids.len().max(1),
            },
            ApprovalType::Any => 1,
        }
    }
}

// ── Flows ────────────────────────────────────────────────────────────

/// An approval flow scoped to a project
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalFlow {
    /// Storage-assigned identifier (immutable)
    pub id: FlowId,
    /// Owning project (immutable)
    pub project: ProjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Sensitivity level this flow gates
    pub level: SensitivityLevel,
    /// Only enabled flows participate in selection
    pub enabled: bool,
    /// Ordered by `position`, never empty
    pub nodes: Vec<ApprovalNode>,
    pub creator: UserId,
    pub updater: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalFlow {
    /// Node at the given 1-based position
    pub fn node_at(&self, position: u32) -> Option<&ApprovalNode> {
        self.nodes.iter().find(|n| n.position == position)
    }

    /// Highest node position, or 0 for an (invalid) empty flow
    pub fn last_position(&self) -> u32 {
        self.nodes.iter().map(|n| n.position).max().unwrap_or(0)
    }

    /// Check that node positions are 1-based, unique, and contiguous
    pub fn positions_are_contiguous(&self) -> bool {
        let mut positions: Vec<u32> = self.nodes.iter().map(|n| n.position).collect();
        positions.sort_unstable();
        positions
            .iter()
            .enumerate()
            .all(|(i, p)| *p == (i as u32) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(position: u32, approvers: &[&str], approval_type: ApprovalType) -> ApprovalNode {
        ApprovalNode {
            id: NodeId::new(position as i64),
            flow_id: FlowId::new(1),
            position,
            title: format!("step {position}"),
            description: String::new(),
            approver_type: ApproverType::User,
            approver_ids: approvers.iter().map(|a| a.to_string()).collect(),
            approval_type,
        }
    }

    #[test]
    fn required_approvals_all_counts_approvers() {
        let n = node(1, &["a", "b", "c"], ApprovalType::All);
        assert_eq!(n.required_approvals(), 3);
    }

    #[test]
    fn required_approvals_any_is_one() {
        let n = node(1, &["a", "b", "c"], ApprovalType::Any);
        assert_eq!(n.required_approvals(), 1);
    }

    #[test]
    fn required_approvals_self_is_one() {
        let mut n = node(1, &[], ApprovalType::All);
        n.approver_type = ApproverType::SelfApprover;
        assert_eq!(n.required_approvals(), 1);
    }

    #[test]
    fn contiguous_positions() {
        let flow = ApprovalFlow {
            id: FlowId::new(1),
            project: ProjectId::new("p"),
            title: "t".into(),
            description: String::new(),
            level: SensitivityLevel::High,
            enabled: true,
            nodes: vec![
                node(2, &["b"], ApprovalType::All),
                node(1, &["a"], ApprovalType::All),
            ],
            creator: UserId::new("u"),
            updater: UserId::new("u"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(flow.positions_are_contiguous());
        assert_eq!(flow.last_position(), 2);
        assert_eq!(flow.node_at(2).unwrap().approver_ids, vec!["b"]);
    }
}
