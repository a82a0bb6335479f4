//! Sensitive data rules
//!
//! A rule binds a sensitivity level to a table pattern plus a set of field
//! patterns. Rules are long-lived, mutable, and scoped to one project.

use crate::{ProjectId, RuleId, SensitivityLevel, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Field Patterns ───────────────────────────────────────────────────

/// One field-matching clause of a rule.
///
/// A pattern matches a field if `name` equals it (with `*` expanding to any
/// run of characters), or — failing that — if `regex` is non-empty, compiles,
/// and matches. An invalid regex disables that clause only, never the rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPattern {
    /// Literal field name or `*` glob (e.g. `email`, `*_password`)
    #[serde(default)]
    pub name: String,
    /// Optional regular expression tried when `name` does not match
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub regex: String,
}

impl FieldPattern {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regex: String::new(),
        }
    }

    pub fn with_regex(regex: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            regex: regex.into(),
        }
    }
}

// ── Rules ────────────────────────────────────────────────────────────

/// A sensitive data rule scoped to a project
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensitiveDataRule {
    /// Storage-assigned identifier (immutable)
    pub id: RuleId,
    /// Owning project (immutable)
    pub project: ProjectId,
    /// Unique title among the project's non-deleted rules
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Sensitivity level this rule assigns to matched fields
    pub level: SensitivityLevel,
    /// Disabled rules are skipped by classification
    pub enabled: bool,
    /// Qualified table name matched case-insensitively; blank matches any
    #[serde(default)]
    pub table_pattern: String,
    /// Ordered field clauses; a rule matches a field if any clause does
    #[serde(default)]
    pub field_patterns: Vec<FieldPattern>,
    pub creator: UserId,
    pub updater: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One `(table, field)` pair affected by a proposed change
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub field: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.field)
    }
}

/// Audit record written when a sensitive plan is first gated.
///
/// One row per matched `(table, field)` pair; immutable once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensitiveDataChange {
    /// Execution created for the change, if one was required
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<crate::ExecutionId>,
    pub issue_id: crate::IssueId,
    pub table: String,
    pub field: String,
    /// Level of the rule that matched this pair
    pub level: SensitivityLevel,
    /// Rule that matched this pair
    pub rule_id: RuleId,
    pub created_at: DateTime<Utc>,
}
