//! Approver authorization
//!
//! The engine resolves `User` and `SelfApprover` specifications itself;
//! group and role membership is an external concern answered by an injected
//! [`AuthorityResolver`]. A static implementation is provided for tests and
//! development.

use async_trait::async_trait;
use datagate_types::{ApproverType, IssueId, ProjectId, UserId};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Failure while consulting the external authority source.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AuthorityError(pub String);

/// Context passed to membership queries.
#[derive(Debug, Clone)]
pub struct AuthorityContext {
    pub project: ProjectId,
    pub issue_id: IssueId,
}

/// Trait for resolving group/role membership and project administration.
#[async_trait]
pub trait AuthorityResolver: Send + Sync {
    /// Whether `user` belongs to any of the groups or roles listed in
    /// `approver_ids` (interpretation per `approver_type`).
    async fn has_role(
        &self,
        user: &UserId,
        approver_type: ApproverType,
        approver_ids: &[String],
        context: &AuthorityContext,
    ) -> Result<bool, AuthorityError>;

    /// Whether `user` administers `project` (grants cancel rights).
    async fn is_project_admin(
        &self,
        user: &UserId,
        project: &ProjectId,
    ) -> Result<bool, AuthorityError>;
}

/// Static membership table for testing and development.
#[derive(Default)]
pub struct StaticAuthorityResolver {
    memberships: HashMap<String, HashSet<String>>,
    admins: HashMap<String, HashSet<String>>,
}

impl StaticAuthorityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user` as a member of a group or role.
    pub fn with_member(mut self, user: impl Into<String>, group_or_role: impl Into<String>) -> Self {
        self.memberships
            .entry(user.into())
            .or_default()
            .insert(group_or_role.into());
        self
    }

    /// Register `user` as an admin of `project`.
    pub fn with_admin(mut self, project: impl Into<String>, user: impl Into<String>) -> Self {
        self.admins
            .entry(project.into())
            .or_default()
            .insert(user.into());
        self
    }
}

#[async_trait]
impl AuthorityResolver for StaticAuthorityResolver {
    async fn has_role(
        &self,
        user: &UserId,
        _approver_type: ApproverType,
        approver_ids: &[String],
        _context: &AuthorityContext,
    ) -> Result<bool, AuthorityError> {
        let Some(memberships) = self.memberships.get(user.as_str()) else {
            return Ok(false);
        };
        Ok(approver_ids.iter().any(|id| memberships.contains(id)))
    }

    async fn is_project_admin(
        &self,
        user: &UserId,
        project: &ProjectId,
    ) -> Result<bool, AuthorityError> {
        Ok(self
            .admins
            .get(project.as_str())
            .map(|users| users.contains(user.as_str()))
            .unwrap_or(false))
    }
}

#[async_trait]
impl<T: AuthorityResolver> AuthorityResolver for std::sync::Arc<T> {
    async fn has_role(
        &self,
        user: &UserId,
        approver_type: ApproverType,
        approver_ids: &[String],
        context: &AuthorityContext,
    ) -> Result<bool, AuthorityError> {
        self.as_ref()
            .has_role(user, approver_type, approver_ids, context)
            .await
    }

    async fn is_project_admin(
        &self,
        user: &UserId,
        project: &ProjectId,
    ) -> Result<bool, AuthorityError> {
        self.as_ref().is_project_admin(user, project).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> AuthorityContext {
        AuthorityContext {
            project: ProjectId::new("proj-1"),
            issue_id: IssueId::new(1),
        }
    }

    #[tokio::test]
    async fn member_of_listed_role_is_authorized() {
        let resolver = StaticAuthorityResolver::new().with_member("alice", "dba");
        let ok = resolver
            .has_role(
                &UserId::new("alice"),
                ApproverType::Role,
                &["dba".to_string()],
                &context(),
            )
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn non_member_is_not_authorized() {
        let resolver = StaticAuthorityResolver::new().with_member("alice", "dba");
        let ok = resolver
            .has_role(
                &UserId::new("bob"),
                ApproverType::Role,
                &["dba".to_string()],
                &context(),
            )
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn admin_lookup_is_scoped_by_project() {
        let resolver = StaticAuthorityResolver::new().with_admin("proj-1", "root");
        assert!(resolver
            .is_project_admin(&UserId::new("root"), &ProjectId::new("proj-1"))
            .await
            .unwrap());
        assert!(!resolver
            .is_project_admin(&UserId::new("root"), &ProjectId::new("proj-2"))
            .await
            .unwrap());
    }
}
