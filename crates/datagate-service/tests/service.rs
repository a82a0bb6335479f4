//! Service-level CRUD, validation, and entry-point scenarios.

use datagate_engine::{GateConfig, NullSink, StaticAuthorityResolver, StaticExtractor, Verdict};
use datagate_service::{
    resource, CheckPlanRequest, CreateFlowRequest, CreateRuleRequest, SensitiveDataService,
    ServiceError, UpdateFlowRequest, UpdateRuleRequest,
};
use datagate_storage::{InMemoryDataGateStore, NewNode, QueryWindow};
use datagate_types::{
    ApprovalType, ApproverType, ColumnRef, Decision, ExecutionStatus, FieldPattern, IssueId,
    SensitivityLevel, UserId,
};
use std::sync::Arc;

type TestService = SensitiveDataService<
    InMemoryDataGateStore,
    StaticAuthorityResolver,
    NullSink,
    StaticExtractor,
>;

fn service(columns: Vec<ColumnRef>) -> TestService {
    SensitiveDataService::new(
        Arc::new(InMemoryDataGateStore::new()),
        StaticAuthorityResolver::new(),
        NullSink,
        StaticExtractor::new(columns),
        GateConfig {
            use_default_flows: false,
        },
    )
}

fn rule_request(title: &str, level: SensitivityLevel) -> CreateRuleRequest {
    CreateRuleRequest {
        parent: "projects/p1".to_string(),
        title: title.to_string(),
        description: String::new(),
        level,
        enabled: true,
        table_pattern: "users".to_string(),
        field_patterns: vec![FieldPattern::named("email")],
        actor: UserId::new("admin"),
    }
}

fn self_node(position: u32) -> NewNode {
    NewNode {
        position,
        title: "requester confirmation".to_string(),
        description: String::new(),
        approver_type: ApproverType::SelfApprover,
        approver_ids: Vec::new(),
        approval_type: ApprovalType::All,
    }
}

fn user_node(position: u32, approvers: &[&str]) -> NewNode {
    NewNode {
        position,
        title: format!("step {position}"),
        description: String::new(),
        approver_type: ApproverType::User,
        approver_ids: approvers.iter().map(|a| a.to_string()).collect(),
        approval_type: ApprovalType::All,
    }
}

fn flow_request(title: &str, level: SensitivityLevel, nodes: Vec<NewNode>) -> CreateFlowRequest {
    CreateFlowRequest {
        parent: "projects/p1".to_string(),
        title: title.to_string(),
        description: String::new(),
        level,
        enabled: true,
        nodes,
        actor: UserId::new("admin"),
    }
}

fn check_request(issue: i64, creator: &str) -> CheckPlanRequest {
    CheckPlanRequest {
        parent: "projects/p1".to_string(),
        issue_id: IssueId::new(issue),
        creator: UserId::new(creator),
        statement: "UPDATE users SET email = 'x'".to_string(),
        database: "appdb".to_string(),
    }
}

#[tokio::test]
async fn create_rule_requires_title_and_level() {
    let svc = service(Vec::new());

    let err = svc
        .create_rule(rule_request("", SensitivityLevel::Low))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));

    let err = svc
        .create_rule(rule_request("pii", SensitivityLevel::Unspecified))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn rule_round_trip_and_duplicate_title() {
    let svc = service(Vec::new());

    let created = svc
        .create_rule(rule_request("pii", SensitivityLevel::High))
        .await
        .unwrap();
    let name = resource::rule_name(&created.project, created.id);

    let fetched = svc.get_rule(&name).await.unwrap();
    assert_eq!(fetched.title, created.title);
    assert_eq!(fetched.level, created.level);
    assert_eq!(fetched.field_patterns, created.field_patterns);

    let err = svc
        .create_rule(rule_request("pii", SensitivityLevel::Low))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));
}

#[tokio::test]
async fn rule_update_and_delete() {
    let svc = service(Vec::new());
    let created = svc
        .create_rule(rule_request("pii", SensitivityLevel::Low))
        .await
        .unwrap();
    let name = resource::rule_name(&created.project, created.id);

    let updated = svc
        .update_rule(
            &name,
            UpdateRuleRequest {
                level: Some(SensitivityLevel::High),
                enabled: Some(false),
                ..UpdateRuleRequest::default()
            },
            UserId::new("editor"),
        )
        .await
        .unwrap();
    assert_eq!(updated.level, SensitivityLevel::High);
    assert!(!updated.enabled);
    assert_eq!(updated.updater, UserId::new("editor"));

    svc.delete_rule(&name).await.unwrap();
    let err = svc.get_rule(&name).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn rule_is_scoped_to_its_project() {
    let svc = service(Vec::new());
    let created = svc
        .create_rule(rule_request("pii", SensitivityLevel::Low))
        .await
        .unwrap();

    let foreign = format!("projects/other/{}/{}", resource::RULE_COLLECTION, created.id);
    let err = svc.get_rule(&foreign).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn create_flow_validates_structure() {
    let svc = service(Vec::new());

    let err = svc
        .create_flow(flow_request("f", SensitivityLevel::Low, Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));

    let err = svc
        .create_flow(flow_request(
            "f",
            SensitivityLevel::Low,
            vec![user_node(1, &["a"]), user_node(3, &["b"])],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));

    let err = svc
        .create_flow(flow_request(
            "f",
            SensitivityLevel::Low,
            vec![user_node(1, &[])],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));
}

#[tokio::test]
async fn one_enabled_flow_per_level() {
    let svc = service(Vec::new());
    svc.create_flow(flow_request(
        "low flow",
        SensitivityLevel::Low,
        vec![self_node(1)],
    ))
    .await
    .unwrap();

    let err = svc
        .create_flow(flow_request(
            "another low flow",
            SensitivityLevel::Low,
            vec![self_node(1)],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));
}

#[tokio::test]
async fn flow_structure_is_frozen_while_executions_reference_it() {
    let svc = service(vec![ColumnRef::new("users", "email")]);
    svc.create_rule(rule_request("pii", SensitivityLevel::Low))
        .await
        .unwrap();
    let flow = svc
        .create_flow(flow_request(
            "low flow",
            SensitivityLevel::Low,
            vec![self_node(1)],
        ))
        .await
        .unwrap();
    let flow_name = resource::flow_name(&flow.project, flow.id);

    // Start an execution through the gate.
    let verdict = svc.check_plan(check_request(1, "uma")).await.unwrap();
    assert!(matches!(verdict, Verdict::Block { .. }));

    // Replacing nodes is now rejected...
    let err = svc
        .update_flow(
            &flow_name,
            UpdateFlowRequest {
                nodes: Some(vec![user_node(1, &["alice"])]),
                ..UpdateFlowRequest::default()
            },
            UserId::new("admin"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::FailedPrecondition(_)));

    // ...and so is deletion, but metadata updates still pass.
    let err = svc.delete_flow(&flow_name).await.unwrap_err();
    assert!(matches!(err, ServiceError::FailedPrecondition(_)));

    let updated = svc
        .update_flow(
            &flow_name,
            UpdateFlowRequest {
                description: Some("gated".to_string()),
                ..UpdateFlowRequest::default()
            },
            UserId::new("admin"),
        )
        .await
        .unwrap();
    assert_eq!(updated.description, "gated");
}

#[tokio::test]
async fn decision_and_cancel_through_resource_names() {
    let svc = service(vec![ColumnRef::new("users", "email")]);
    svc.create_rule(rule_request("pii", SensitivityLevel::Low))
        .await
        .unwrap();
    let flow = svc
        .create_flow(flow_request(
            "low flow",
            SensitivityLevel::Low,
            vec![self_node(1)],
        ))
        .await
        .unwrap();

    let verdict = svc.check_plan(check_request(1, "uma")).await.unwrap();
    let execution_id = match verdict {
        Verdict::Block { execution_id, .. } => execution_id,
        other => panic!("expected block, got {other:?}"),
    };
    let name = resource::execution_name(&flow.project, execution_id);

    let fetched = svc.get_execution(&name).await.unwrap();
    assert_eq!(fetched.status, ExecutionStatus::InProgress);

    let recorded = svc
        .record_decision(
            &name,
            1,
            UserId::new("uma"),
            Decision::Approved,
            String::new(),
        )
        .await
        .unwrap();
    assert_eq!(recorded.flow_status, ExecutionStatus::Approved);

    // Terminal executions cannot be cancelled.
    let err = svc
        .cancel_execution(&name, UserId::new("uma"), "late".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::FailedPrecondition(_)));
}

#[tokio::test]
async fn execution_names_are_project_scoped() {
    let svc = service(vec![ColumnRef::new("users", "email")]);
    svc.create_rule(rule_request("pii", SensitivityLevel::Low))
        .await
        .unwrap();
    svc.create_flow(flow_request(
        "low flow",
        SensitivityLevel::Low,
        vec![self_node(1)],
    ))
    .await
    .unwrap();

    let verdict = svc.check_plan(check_request(1, "uma")).await.unwrap();
    let execution_id = match verdict {
        Verdict::Block { execution_id, .. } => execution_id,
        other => panic!("expected block, got {other:?}"),
    };

    let foreign = format!(
        "projects/other/{}/{}",
        resource::EXECUTION_COLLECTION,
        execution_id
    );
    let err = svc.get_execution(&foreign).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn approvers_receive_request_notifications() {
    let svc = service(vec![ColumnRef::new("users", "email")]);
    svc.create_rule(rule_request("pii", SensitivityLevel::Low))
        .await
        .unwrap();
    svc.create_flow(flow_request(
        "low flow",
        SensitivityLevel::Low,
        vec![user_node(1, &["alice", "bob"])],
    ))
    .await
    .unwrap();

    svc.check_plan(check_request(1, "uma")).await.unwrap();

    let inbox = svc
        .list_notifications("alice", true, QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert!(inbox[0].title.contains("Approval required"));

    let name = resource::notification_name(&datagate_types::ProjectId::new("p1"), inbox[0].id);
    let read = svc.mark_notification_read(&name).await.unwrap();
    assert!(read.read);

    let unread = svc
        .list_notifications("alice", true, QueryWindow::default())
        .await
        .unwrap();
    assert!(unread.is_empty());
}

#[tokio::test]
async fn check_plan_requires_statement() {
    let svc = service(Vec::new());
    let mut request = check_request(1, "uma");
    request.statement = String::new();
    let err = svc.check_plan(request).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));
}
