//! Resource names
//!
//! Entities are addressed with relative resource names:
//! `projects/{project}/sensitiveDataRules/{id}`,
//! `projects/{project}/approvalFlows/{id}`,
//! `projects/{project}/approvalFlowExecutions/{id}`, and
//! `projects/{project}/notifications/{id}`.

use datagate_types::{ExecutionId, FlowId, NotificationId, ProjectId, RuleId};
use thiserror::Error;

pub const RULE_COLLECTION: &str = "sensitiveDataRules";
pub const FLOW_COLLECTION: &str = "approvalFlows";
pub const EXECUTION_COLLECTION: &str = "approvalFlowExecutions";
pub const NOTIFICATION_COLLECTION: &str = "notifications";

/// Malformed resource name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid resource name {name:?}: {reason}")]
pub struct NameError {
    pub name: String,
    pub reason: String,
}

impl NameError {
    fn new(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse a `projects/{project}` parent name.
pub fn parse_project_name(name: &str) -> Result<ProjectId, NameError> {
    let mut segments = name.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some("projects"), Some(project), None) if !project.is_empty() => {
            Ok(ProjectId::new(project))
        }
        _ => Err(NameError::new(name, "expected projects/{project}")),
    }
}

fn parse_child_name(name: &str, collection: &str) -> Result<(ProjectId, i64), NameError> {
    let mut segments = name.split('/');
    match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some("projects"), Some(project), Some(found), Some(id), None)
            if !project.is_empty() && found == collection =>
        {
            let id = id.parse::<i64>().map_err(|_| {
                NameError::new(name, format!("{collection} id must be an integer"))
            })?;
            Ok((ProjectId::new(project), id))
        }
        _ => Err(NameError::new(
            name,
            format!("expected projects/{{project}}/{collection}/{{id}}"),
        )),
    }
}

pub fn parse_rule_name(name: &str) -> Result<(ProjectId, RuleId), NameError> {
    parse_child_name(name, RULE_COLLECTION).map(|(p, id)| (p, RuleId::new(id)))
}

pub fn parse_flow_name(name: &str) -> Result<(ProjectId, FlowId), NameError> {
    parse_child_name(name, FLOW_COLLECTION).map(|(p, id)| (p, FlowId::new(id)))
}

pub fn parse_execution_name(name: &str) -> Result<(ProjectId, ExecutionId), NameError> {
    parse_child_name(name, EXECUTION_COLLECTION).map(|(p, id)| (p, ExecutionId::new(id)))
}

pub fn parse_notification_name(name: &str) -> Result<(ProjectId, NotificationId), NameError> {
    parse_child_name(name, NOTIFICATION_COLLECTION).map(|(p, id)| (p, NotificationId::new(id)))
}

pub fn rule_name(project: &ProjectId, id: RuleId) -> String {
    format!("projects/{project}/{RULE_COLLECTION}/{id}")
}

pub fn flow_name(project: &ProjectId, id: FlowId) -> String {
    format!("projects/{project}/{FLOW_COLLECTION}/{id}")
}

pub fn execution_name(project: &ProjectId, id: ExecutionId) -> String {
    format!("projects/{project}/{EXECUTION_COLLECTION}/{id}")
}

pub fn notification_name(project: &ProjectId, id: NotificationId) -> String {
    format!("projects/{project}/{NOTIFICATION_COLLECTION}/{id}")
}
