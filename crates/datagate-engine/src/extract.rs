//! Change extraction
//!
//! The gate does not parse SQL to production quality; it consumes an
//! already-extracted list of affected `(table, field)` pairs from an
//! injected extractor. Correctness of the core depends only on the
//! extractor's totality, never on its precision.

use datagate_types::ColumnRef;
use regex::Regex;
use thiserror::Error;

/// Failure while extracting affected columns from a statement.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ExtractError(pub String);

/// Extracts the `(table, field)` pairs a statement touches.
pub trait ChangeExtractor: Send + Sync {
    fn extract(&self, sql: &str, database: &str) -> Result<Vec<ColumnRef>, ExtractError>;
}

/// Regex-based extractor covering common UPDATE and SELECT shapes.
///
/// Good enough for development and tests; deployments inject an extractor
/// backed by a real SQL parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveSqlExtractor;

impl ChangeExtractor for NaiveSqlExtractor {
    fn extract(&self, sql: &str, _database: &str) -> Result<Vec<ColumnRef>, ExtractError> {
        let mut columns = Vec::new();

        let update =
            Regex::new(r"(?is)UPDATE\s+([a-zA-Z0-9_.]+)\s+SET\s+(.*?)(?:\s+WHERE\s+.*)?$")
                .map_err(|e| ExtractError(e.to_string()))?;
        if let Some(captures) = update.captures(sql) {
            let table = captures[1].to_string();
            for assignment in captures[2].split(',') {
                let field = assignment.split('=').next().unwrap_or("").trim();
                if !field.is_empty() {
                    push_unique(&mut columns, ColumnRef::new(table.clone(), field));
                }
            }
        }

        let select = Regex::new(r"(?is)SELECT\s+(.*?)\s+FROM\s+([a-zA-Z0-9_.]+)")
            .map_err(|e| ExtractError(e.to_string()))?;
        for captures in select.captures_iter(sql) {
            let table = captures[2].to_string();
            for field in captures[1].split(',') {
                // Strip aliases and skip wildcards.
                let field = field.trim().split_whitespace().next().unwrap_or("");
                if !field.is_empty() && field != "*" {
                    push_unique(&mut columns, ColumnRef::new(table.clone(), field));
                }
            }
        }

        Ok(columns)
    }
}

fn push_unique(columns: &mut Vec<ColumnRef>, column: ColumnRef) {
    if !columns.contains(&column) {
        columns.push(column);
    }
}

/// Extractor returning a fixed column set, for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    pub columns: Vec<ColumnRef>,
}

impl StaticExtractor {
    pub fn new(columns: Vec<ColumnRef>) -> Self {
        Self { columns }
    }
}

impl ChangeExtractor for StaticExtractor {
    fn extract(&self, _sql: &str, _database: &str) -> Result<Vec<ColumnRef>, ExtractError> {
        Ok(self.columns.clone())
    }
}
