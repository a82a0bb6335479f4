//! Identifier newtypes shared across the DataGate aggregates.

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// Storage-assigned identifier of a sensitive data rule
    RuleId
);
numeric_id!(
    /// Storage-assigned identifier of an approval flow
    FlowId
);
numeric_id!(
    /// Storage-assigned identifier of an approval node within a flow
    NodeId
);
numeric_id!(
    /// Storage-assigned identifier of a flow execution
    ExecutionId
);
numeric_id!(
    /// Storage-assigned identifier of a node execution
    NodeExecutionId
);
numeric_id!(
    /// Storage-assigned identifier of a single approval decision.
    ///
    /// Approval ids are monotonic per store and define the total order of
    /// decisions within an execution.
    ApprovalId
);
numeric_id!(
    /// Storage-assigned identifier of a notification record
    NotificationId
);
numeric_id!(
    /// External identifier of the issue a change belongs to
    IssueId
);

/// External key of the project that scopes rules, flows, and executions
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External key of a user (requester or approver)
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
