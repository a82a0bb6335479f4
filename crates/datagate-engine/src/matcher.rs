//! Rule matching
//!
//! Classifies a change's `(table, field)` pairs against a project's rule
//! set and reports the strongest sensitivity level hit. Matching is pure:
//! the caller supplies the (already enabled-filtered) rules and the pairs.
//!
//! Per pair and rule:
//! 1. A non-empty table pattern must equal the qualified table name,
//!    case-insensitively; a blank pattern matches any table.
//! 2. Any one field clause must match: the `name` (with `*` globs) first,
//!    then the `regex` when present. An invalid regex disables only that
//!    clause. A rule without field clauses matches every field.

use datagate_types::{ColumnRef, FieldPattern, RuleId, SensitiveDataRule, SensitivityLevel};
use regex::Regex;

/// One `(rule, column)` hit produced by classification
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule_id: RuleId,
    pub level: SensitivityLevel,
    pub column: ColumnRef,
}

/// Result of classifying a change against a rule set
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Every `(rule, column)` pair that matched
    pub matches: Vec<RuleMatch>,
    /// Strongest level among the matches; `Unspecified` when none matched
    pub max_level: SensitivityLevel,
}

impl MatchOutcome {
    pub fn is_sensitive(&self) -> bool {
        self.max_level.is_specified()
    }

    /// Distinct rules that matched, in first-hit order.
    pub fn matched_rule_ids(&self) -> Vec<RuleId> {
        let mut ids = Vec::new();
        for m in &self.matches {
            if !ids.contains(&m.rule_id) {
                ids.push(m.rule_id);
            }
        }
        ids
    }
}

/// Classify the affected columns against the rules.
///
/// `O(|rules| * |columns|)`; regexes are compiled per clause without
/// caching, which is fine at rule-set scale.
pub fn classify_changes(rules: &[SensitiveDataRule], columns: &[ColumnRef]) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    for column in columns {
        for rule in rules {
            if rule_matches(rule, column) {
                outcome.max_level = outcome.max_level.max(rule.level);
                outcome.matches.push(RuleMatch {
                    rule_id: rule.id,
                    level: rule.level,
                    column: column.clone(),
                });
            }
        }
    }
    outcome
}

fn rule_matches(rule: &SensitiveDataRule, column: &ColumnRef) -> bool {
    if !rule.table_pattern.is_empty()
        && !rule.table_pattern.eq_ignore_ascii_case(&column.table)
    {
        return false;
    }
    if rule.field_patterns.is_empty() {
        return true;
    }
    rule.field_patterns
        .iter()
        .any(|pattern| field_matches(pattern, &column.field))
}

fn field_matches(pattern: &FieldPattern, field: &str) -> bool {
    if !pattern.name.is_empty() {
        if pattern.name == field {
            return true;
        }
        if pattern.name.contains('*') {
            let expanded = format!("^{}$", regex::escape(&pattern.name).replace(r"\*", ".*"));
            if let Ok(re) = Regex::new(&expanded) {
                if re.is_match(field) {
                    return true;
                }
            }
        }
    }
    if !pattern.regex.is_empty() {
        // An invalid regex disables this clause, never the whole rule.
        if let Ok(re) = Regex::new(&pattern.regex) {
            return re.is_match(field);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use datagate_types::{ProjectId, UserId};

    fn rule(
        id: i64,
        level: SensitivityLevel,
        table_pattern: &str,
        field_patterns: Vec<FieldPattern>,
    ) -> SensitiveDataRule {
        SensitiveDataRule {
            id: RuleId::new(id),
            project: ProjectId::new("proj-1"),
            title: format!("rule {id}"),
            description: String::new(),
            level,
            enabled: true,
            table_pattern: table_pattern.to_string(),
            field_patterns,
            creator: UserId::new("admin"),
            updater: UserId::new("admin"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn literal_field_name_matches() {
        let rules = vec![rule(
            1,
            SensitivityLevel::Low,
            "users",
            vec![FieldPattern::named("email")],
        )];
        let outcome = classify_changes(&rules, &[ColumnRef::new("users", "email")]);
        assert_eq!(outcome.max_level, SensitivityLevel::Low);
        assert_eq!(outcome.matches.len(), 1);
    }

    #[test]
    fn table_match_is_case_insensitive() {
        let rules = vec![rule(
            1,
            SensitivityLevel::Medium,
            "Users",
            vec![FieldPattern::named("email")],
        )];
        let outcome = classify_changes(&rules, &[ColumnRef::new("USERS", "email")]);
        assert!(outcome.is_sensitive());
    }

    #[test]
    fn glob_expands_to_any_run() {
        let rules = vec![rule(
            1,
            SensitivityLevel::High,
            "",
            vec![FieldPattern::named("*_password")],
        )];
        let outcome = classify_changes(
            &rules,
            &[
                ColumnRef::new("accounts", "login_password"),
                ColumnRef::new("accounts", "password_hint"),
            ],
        );
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].column.field, "login_password");
    }

    #[test]
    fn regex_clause_is_tried_after_name() {
        let rules = vec![rule(
            1,
            SensitivityLevel::High,
            "",
            vec![FieldPattern::with_regex(r"^card_\d*no$")],
        )];
        let outcome = classify_changes(&rules, &[ColumnRef::new("payments", "card_no")]);
        assert!(outcome.is_sensitive());
    }

    #[test]
    fn invalid_regex_skips_the_clause_only() {
        let rules = vec![rule(
            1,
            SensitivityLevel::High,
            "",
            vec![
                FieldPattern::with_regex("(unclosed"),
                FieldPattern::named("ssn"),
            ],
        )];
        let outcome = classify_changes(&rules, &[ColumnRef::new("people", "ssn")]);
        assert!(outcome.is_sensitive());
    }

    #[test]
    fn blanket_rule_matches_everything() {
        let rules = vec![rule(1, SensitivityLevel::Low, "", Vec::new())];
        let outcome = classify_changes(&rules, &[ColumnRef::new("anything", "at_all")]);
        assert!(outcome.is_sensitive());
    }

    #[test]
    fn wrong_table_does_not_match() {
        let rules = vec![rule(
            1,
            SensitivityLevel::High,
            "payments",
            vec![FieldPattern::named("card_no")],
        )];
        let outcome = classify_changes(&rules, &[ColumnRef::new("orders", "card_no")]);
        assert!(!outcome.is_sensitive());
        assert!(outcome.matches.is_empty());
    }

    #[test]
    fn max_level_is_the_strongest_hit() {
        let rules = vec![
            rule(1, SensitivityLevel::Low, "", vec![FieldPattern::named("email")]),
            rule(2, SensitivityLevel::High, "", vec![FieldPattern::named("card_no")]),
            rule(3, SensitivityLevel::Medium, "", vec![FieldPattern::named("email")]),
        ];
        let outcome = classify_changes(
            &rules,
            &[
                ColumnRef::new("users", "email"),
                ColumnRef::new("payments", "card_no"),
            ],
        );
        assert_eq!(outcome.max_level, SensitivityLevel::High);
        assert_eq!(outcome.matched_rule_ids().len(), 3);
    }

    #[test]
    fn no_rules_means_unspecified() {
        let outcome = classify_changes(&[], &[ColumnRef::new("users", "email")]);
        assert_eq!(outcome.max_level, SensitivityLevel::Unspecified);
    }
}
