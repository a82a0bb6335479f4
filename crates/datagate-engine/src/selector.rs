//! Flow selection
//!
//! Given the strongest level detected on a change, pick the flow that gates
//! it: the enabled flow declared at exactly that level, or — walking *down*
//! the ordinal, never up — the nearest weaker enabled flow. A weaker flow
//! gating a stronger change is acceptable; the reverse would let strong
//! changes slip past strict flows. When nothing is configured, a built-in
//! default per level applies unless defaults are disabled.

use datagate_storage::{NewFlow, NewNode};
use datagate_types::{ApprovalFlow, ApprovalType, ApproverType, ProjectId, SensitivityLevel, UserId};

/// Creator recorded on materialized built-in flows
const BUILTIN_CREATOR: &str = "system";

/// Outcome of flow selection
#[derive(Debug, Clone)]
pub enum FlowSelection {
    /// The change is not sensitive; no approval is required
    NotRequired,
    /// An enabled stored flow gates the change
    Existing(ApprovalFlow),
    /// No stored flow exists; the built-in default for the level applies
    BuiltIn(NewFlow),
    /// No stored flow exists and defaults are disabled
    Missing,
}

/// Select the flow gating a change of the given maximum level.
pub fn select_flow(
    flows: &[ApprovalFlow],
    project: &ProjectId,
    max_level: SensitivityLevel,
    use_defaults: bool,
) -> FlowSelection {
    if !max_level.is_specified() {
        return FlowSelection::NotRequired;
    }

    for level in SensitivityLevel::ORDERED_DESC {
        if level > max_level {
            continue;
        }
        if let Some(flow) = flows.iter().find(|f| f.enabled && f.level == level) {
            return FlowSelection::Existing(flow.clone());
        }
    }

    match (use_defaults, builtin_flow(project, max_level)) {
        (true, Some(flow)) => FlowSelection::BuiltIn(flow),
        _ => FlowSelection::Missing,
    }
}

/// Built-in default flow for a level, ready to be materialized.
pub fn builtin_flow(project: &ProjectId, level: SensitivityLevel) -> Option<NewFlow> {
    let (title, nodes) = match level {
        SensitivityLevel::High => (
            "High Sensitivity Approval",
            vec![
                role_node(1, "Security review", &["security-admin"]),
                role_node(2, "DBA sign-off", &["dba"]),
            ],
        ),
        SensitivityLevel::Medium => (
            "Medium Sensitivity Approval",
            vec![role_node(1, "DBA sign-off", &["dba"])],
        ),
        SensitivityLevel::Low => (
            "Low Sensitivity Approval",
            vec![NewNode {
                position: 1,
                title: "Requester confirmation".to_string(),
                description: String::new(),
                approver_type: ApproverType::SelfApprover,
                approver_ids: Vec::new(),
                approval_type: ApprovalType::All,
            }],
        ),
        SensitivityLevel::Unspecified => return None,
    };

    Some(NewFlow {
        project: project.clone(),
        title: title.to_string(),
        description: format!("Default approval flow for {level} sensitivity changes"),
        level,
        enabled: true,
        nodes,
        creator: UserId::new(BUILTIN_CREATOR),
    })
}

fn role_node(position: u32, title: &str, roles: &[&str]) -> NewNode {
    NewNode {
        position,
        title: title.to_string(),
        description: String::new(),
        approver_type: ApproverType::Role,
        approver_ids: roles.iter().map(|r| r.to_string()).collect(),
        approval_type: ApprovalType::All,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use datagate_types::FlowId;

    fn flow(id: i64, level: SensitivityLevel, enabled: bool) -> ApprovalFlow {
        ApprovalFlow {
            id: FlowId::new(id),
            project: ProjectId::new("proj-1"),
            title: format!("flow {id}"),
            description: String::new(),
            level,
            enabled,
            nodes: Vec::new(),
            creator: UserId::new("admin"),
            updater: UserId::new("admin"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn project() -> ProjectId {
        ProjectId::new("proj-1")
    }

    #[test]
    fn unspecified_level_requires_no_flow() {
        let selection = select_flow(&[], &project(), SensitivityLevel::Unspecified, true);
        assert!(matches!(selection, FlowSelection::NotRequired));
    }

    #[test]
    fn exact_level_wins() {
        let flows = vec![
            flow(1, SensitivityLevel::Low, true),
            flow(2, SensitivityLevel::High, true),
        ];
        let selection = select_flow(&flows, &project(), SensitivityLevel::High, true);
        match selection {
            FlowSelection::Existing(f) => assert_eq!(f.id, FlowId::new(2)),
            other => panic!("expected existing flow, got {other:?}"),
        }
    }

    #[test]
    fn walks_down_but_never_up() {
        // Only a MEDIUM flow exists: HIGH changes walk down to it...
        let flows = vec![flow(1, SensitivityLevel::Medium, true)];
        let selection = select_flow(&flows, &project(), SensitivityLevel::High, false);
        assert!(matches!(selection, FlowSelection::Existing(_)));

        // ...but LOW changes must not walk up to the MEDIUM flow.
        let selection = select_flow(&flows, &project(), SensitivityLevel::Low, false);
        assert!(matches!(selection, FlowSelection::Missing));
    }

    #[test]
    fn disabled_flows_are_ignored() {
        let flows = vec![flow(1, SensitivityLevel::High, false)];
        let selection = select_flow(&flows, &project(), SensitivityLevel::High, false);
        assert!(matches!(selection, FlowSelection::Missing));
    }

    #[test]
    fn builtin_default_applies_when_enabled() {
        let selection = select_flow(&[], &project(), SensitivityLevel::High, true);
        match selection {
            FlowSelection::BuiltIn(new_flow) => {
                assert_eq!(new_flow.level, SensitivityLevel::High);
                assert_eq!(new_flow.nodes.len(), 2);
                assert_eq!(new_flow.nodes[0].approver_ids, vec!["security-admin"]);
                assert_eq!(new_flow.nodes[1].approver_ids, vec!["dba"]);
            }
            other => panic!("expected builtin flow, got {other:?}"),
        }
    }

    #[test]
    fn builtin_low_flow_is_self_approval() {
        let new_flow = builtin_flow(&project(), SensitivityLevel::Low).unwrap();
        assert_eq!(new_flow.nodes.len(), 1);
        assert_eq!(new_flow.nodes[0].approver_type, ApproverType::SelfApprover);
        assert!(new_flow.nodes[0].approver_ids.is_empty());
    }

    #[test]
    fn defaults_disabled_means_missing() {
        let selection = select_flow(&[], &project(), SensitivityLevel::Medium, false);
        assert!(matches!(selection, FlowSelection::Missing));
    }
}
