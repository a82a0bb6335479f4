//! Execution state machine
//!
//! The advance logic is pure: given a node's quorum rule and the decision
//! set after the incoming decision, compute the node's disposition and the
//! full transition (node status, promotion, flow status, new current
//! position). The engine turns the plan into one transactional storage
//! write; nothing here touches I/O.
//!
//! Decision rules, applied on every recorded decision:
//! 1. Any rejection settles the node as rejected and the flow as rejected.
//!    Higher-position nodes stay pending as a frozen record.
//! 2. Otherwise, once approvals reach the node's quorum the node settles as
//!    approved; the flow completes if this was the last node, or the next
//!    position is promoted to in-progress.
//! 3. Otherwise the node stays in progress.

use datagate_types::{
    Approval, ApprovalNode, Decision, ExecutionStatus, NodeExecutionStatus,
};

/// Disposition of one node under its quorum rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeDisposition {
    /// Quorum not yet met; the node keeps collecting decisions
    InProgress,
    /// Quorum met with no rejections
    Approved,
    /// At least one rejection recorded
    Rejected,
}

/// Full effect of one decision on an execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Status of the decided node after the decision
    pub node_status: NodeExecutionStatus,
    /// Position promoted from pending to in-progress, if any
    pub promote_position: Option<u32>,
    /// Execution status after the decision
    pub flow_status: ExecutionStatus,
    /// Current position after the decision; `None` once terminal
    pub new_current_position: Option<u32>,
}

/// Evaluate a node's disposition from its decision set.
///
/// The first rejection wins over any number of approvals; decisions are
/// totally ordered by storage-assigned id, so "first" is well defined.
pub fn evaluate_node(node: &ApprovalNode, approvals: &[Approval]) -> NodeDisposition {
    if approvals.iter().any(|a| a.decision == Decision::Rejected) {
        return NodeDisposition::Rejected;
    }
    let approved = approvals
        .iter()
        .filter(|a| a.decision == Decision::Approved)
        .count();
    if approved >= node.required_approvals() {
        NodeDisposition::Approved
    } else {
        NodeDisposition::InProgress
    }
}

/// Plan the transition for a decision at `position`, with `approvals` being
/// the node's decision set including the incoming decision.
pub fn plan_transition(
    node: &ApprovalNode,
    last_position: u32,
    position: u32,
    approvals: &[Approval],
) -> TransitionPlan {
    match evaluate_node(node, approvals) {
        NodeDisposition::Rejected => TransitionPlan {
            node_status: NodeExecutionStatus::Rejected,
            promote_position: None,
            flow_status: ExecutionStatus::Rejected,
            new_current_position: None,
        },
        NodeDisposition::Approved => {
            if position >= last_position {
                TransitionPlan {
                    node_status: NodeExecutionStatus::Approved,
                    promote_position: None,
                    flow_status: ExecutionStatus::Approved,
                    new_current_position: None,
                }
            } else {
                TransitionPlan {
                    node_status: NodeExecutionStatus::Approved,
                    promote_position: Some(position + 1),
                    flow_status: ExecutionStatus::InProgress,
                    new_current_position: Some(position + 1),
                }
            }
        }
        NodeDisposition::InProgress => TransitionPlan {
            node_status: NodeExecutionStatus::InProgress,
            promote_position: None,
            flow_status: ExecutionStatus::InProgress,
            new_current_position: Some(position),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use datagate_types::{
        ApprovalId, ApprovalType, ApproverType, FlowId, NodeExecutionId, NodeId, UserId,
    };

    fn node(approvers: &[&str], approval_type: ApprovalType) -> ApprovalNode {
        ApprovalNode {
            id: NodeId::new(1),
            flow_id: FlowId::new(1),
            position: 1,
            title: "review".into(),
            description: String::new(),
            approver_type: ApproverType::User,
            approver_ids: approvers.iter().map(|a| a.to_string()).collect(),
            approval_type,
        }
    }

    fn approval(id: i64, user: &str, decision: Decision) -> Approval {
        Approval {
            id: ApprovalId::new(id),
            node_execution_id: NodeExecutionId::new(1),
            user_id: UserId::new(user),
            decision,
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn all_quorum_needs_every_approver() {
        let node = node(&["a", "b"], ApprovalType::All);
        let partial = [approval(1, "a", Decision::Approved)];
        assert_eq!(evaluate_node(&node, &partial), NodeDisposition::InProgress);

        let full = [
            approval(1, "a", Decision::Approved),
            approval(2, "b", Decision::Approved),
        ];
        assert_eq!(evaluate_node(&node, &full), NodeDisposition::Approved);
    }

    #[test]
    fn any_quorum_settles_on_first_approval() {
        let node = node(&["a", "b", "c"], ApprovalType::Any);
        let approvals = [approval(1, "b", Decision::Approved)];
        assert_eq!(evaluate_node(&node, &approvals), NodeDisposition::Approved);
    }

    #[test]
    fn one_rejection_wins_over_approvals() {
        let node = node(&["a", "b", "c"], ApprovalType::All);
        let approvals = [
            approval(1, "a", Decision::Approved),
            approval(2, "b", Decision::Rejected),
            approval(3, "c", Decision::Approved),
        ];
        assert_eq!(evaluate_node(&node, &approvals), NodeDisposition::Rejected);
    }

    #[test]
    fn rejection_terminates_the_flow() {
        let node = node(&["a", "b"], ApprovalType::All);
        let approvals = [
            approval(1, "a", Decision::Approved),
            approval(2, "b", Decision::Rejected),
        ];
        let plan = plan_transition(&node, 2, 1, &approvals);
        assert_eq!(plan.node_status, NodeExecutionStatus::Rejected);
        assert_eq!(plan.flow_status, ExecutionStatus::Rejected);
        assert_eq!(plan.promote_position, None);
        assert_eq!(plan.new_current_position, None);
    }

    #[test]
    fn mid_flow_approval_promotes_next_position() {
        let node = node(&["a"], ApprovalType::All);
        let approvals = [approval(1, "a", Decision::Approved)];
        let plan = plan_transition(&node, 3, 1, &approvals);
        assert_eq!(plan.node_status, NodeExecutionStatus::Approved);
        assert_eq!(plan.promote_position, Some(2));
        assert_eq!(plan.flow_status, ExecutionStatus::InProgress);
        assert_eq!(plan.new_current_position, Some(2));
    }

    #[test]
    fn last_node_approval_completes_the_flow() {
        let node = node(&["a"], ApprovalType::All);
        let approvals = [approval(1, "a", Decision::Approved)];
        let plan = plan_transition(&node, 1, 1, &approvals);
        assert_eq!(plan.node_status, NodeExecutionStatus::Approved);
        assert_eq!(plan.flow_status, ExecutionStatus::Approved);
        assert_eq!(plan.new_current_position, None);
    }

    #[test]
    fn unmet_quorum_keeps_the_node_in_progress() {
        let node = node(&["a", "b", "c"], ApprovalType::All);
        let approvals = [approval(1, "a", Decision::Approved)];
        let plan = plan_transition(&node, 2, 1, &approvals);
        assert_eq!(plan.node_status, NodeExecutionStatus::InProgress);
        assert_eq!(plan.flow_status, ExecutionStatus::InProgress);
        assert_eq!(plan.new_current_position, Some(1));
    }
}
