//! Reverse-reference analysis.
//!
//! Given a target column (or a single row id), find the columns elsewhere
//! that point at it and compare what each database holds in them. The
//! concurrent fan-out lives in [`Orchestrator`](crate::Orchestrator);
//! this module holds the report types and the per-constraint work.

pub mod script;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::core::{DataAccess, ReferencingColumn, SqlValue};
use crate::error::Result;

pub use script::render_corrective_script;

/// Referencing column and the values each side holds in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceMatch {
    pub table_name: String,
    pub schema: String,
    pub column_name: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub constraint_name: String,

    pub db1_references: Vec<SqlValue>,
    pub db2_references: Vec<SqlValue>,
    pub common_references: Vec<SqlValue>,
    pub only_in_db1: Vec<SqlValue>,
    pub only_in_db2: Vec<SqlValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReferenceMatch {
    fn empty(column: &ReferencingColumn) -> Self {
        Self {
            table_name: column.table_name.clone(),
            schema: column.schema.clone(),
            column_name: column.column_name.clone(),
            constraint_name: column.constraint_name.clone(),
            db1_references: Vec::new(),
            db2_references: Vec::new(),
            common_references: Vec::new(),
            only_in_db1: Vec::new(),
            only_in_db2: Vec::new(),
            error: None,
        }
    }

    /// Entry for a constraint whose task never reported back.
    pub fn failed(column: &ReferencingColumn, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(column)
        }
    }
}

/// Report of `find_references`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceReport {
    pub target_table: String,
    pub target_schema: String,
    pub target_column: String,
    pub timestamp: DateTime<Utc>,

    /// Sum over references of DB1 plus DB2 value counts.
    pub total_references: usize,
    pub referencing_tables: usize,
    pub references: Vec<ReferenceMatch>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ReferenceReport {
    pub fn new(schema: &str, table: &str, column: &str) -> Self {
        Self {
            target_table: table.to_string(),
            target_schema: schema.to_string(),
            target_column: column.to_string(),
            timestamp: Utc::now(),
            total_references: 0,
            referencing_tables: 0,
            references: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Set the references and recompute the totals.
    pub fn with_references(mut self, references: Vec<ReferenceMatch>) -> Self {
        self.referencing_tables = references.len();
        self.total_references = references
            .iter()
            .map(|r| r.db1_references.len() + r.db2_references.len())
            .sum();
        self.references = references;
        self
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A candidate column holding the target id on at least one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferencingTable {
    pub schema: String,
    pub table_name: String,
    pub column_name: String,
    pub constraint_name: String,
    pub matches_db1: u64,
    pub matches_db2: u64,

    /// DB1 sample values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample_rows: Vec<String>,
}

/// Report of `analyze_references_to_row`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceAnalysisReport {
    pub target_table: String,
    pub target_schema: String,
    pub target_id: String,
    pub timestamp: DateTime<Utc>,

    /// Candidates examined, including those with no matches.
    pub total_constraints: usize,
    pub referencing_tables: Vec<ReferencingTable>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ReferenceAnalysisReport {
    pub fn new(schema: &str, table: &str, target_id: &str) -> Self {
        Self {
            target_table: table.to_string(),
            target_schema: schema.to_string(),
            target_id: target_id.to_string(),
            timestamp: Utc::now(),
            total_constraints: 0,
            referencing_tables: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Split two value lists into common, only-first and only-second.
///
/// Values are compared by canonical string. Each output list keeps the
/// order of first occurrence and holds no duplicates.
pub fn categorize_values(
    values1: &[SqlValue],
    values2: &[SqlValue],
) -> (Vec<SqlValue>, Vec<SqlValue>, Vec<SqlValue>) {
    let keys1: HashSet<String> = values1.iter().map(SqlValue::canonical).collect();
    let keys2: HashSet<String> = values2.iter().map(SqlValue::canonical).collect();

    let mut common = Vec::new();
    let mut only_first = Vec::new();
    let mut seen = HashSet::new();
    for value in values1 {
        let key = value.canonical();
        if !seen.insert(key.clone()) {
            continue;
        }
        if keys2.contains(&key) {
            common.push(value.clone());
        } else {
            only_first.push(value.clone());
        }
    }

    let mut seen = HashSet::new();
    let only_second = values2
        .iter()
        .filter(|v| {
            let key = v.canonical();
            !keys1.contains(&key) && seen.insert(key)
        })
        .cloned()
        .collect();

    (common, only_first, only_second)
}

/// Union of constraints found on both sides, keyed by location.
///
/// DB1 entries come first; DB2 entries are appended when new.
pub fn union_constraints(
    side1: Vec<ReferencingColumn>,
    side2: Vec<ReferencingColumn>,
) -> Vec<ReferencingColumn> {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    side1
        .into_iter()
        .chain(side2)
        .filter(|c| {
            seen.insert((
                c.schema.clone(),
                c.table_name.clone(),
                c.column_name.clone(),
            ))
        })
        .collect()
}

/// Fetch the distinct values of one referencing column from both sides and classify them.
///
/// A side whose fetch fails contributes no values and is named in the error.
pub async fn compare_reference_values(
    column: &ReferencingColumn,
    db1: &dyn DataAccess,
    db2: &dyn DataAccess,
) -> ReferenceMatch {
    let (values1, values2) = tokio::join!(
        db1.get_distinct_column_values(&column.schema, &column.table_name, &column.column_name),
        db2.get_distinct_column_values(&column.schema, &column.table_name, &column.column_name),
    );

    let mut errors = Vec::new();
    let values1 = values1.unwrap_or_else(|e| {
        errors.push(format!("DB1: {}", e));
        Vec::new()
    });
    let values2 = values2.unwrap_or_else(|e| {
        errors.push(format!("DB2: {}", e));
        Vec::new()
    });

    let (common, only1, only2) = categorize_values(&values1, &values2);
    debug!(
        "{}.{}: {} common, {} only DB1, {} only DB2",
        column.full_name(),
        column.column_name,
        common.len(),
        only1.len(),
        only2.len()
    );

    ReferenceMatch {
        db1_references: values1,
        db2_references: values2,
        common_references: common,
        only_in_db1: only1,
        only_in_db2: only2,
        error: (!errors.is_empty()).then(|| errors.join("; ")),
        ..ReferenceMatch::empty(column)
    }
}

/// Columns that may reference a row of `schema.table`.
///
/// Formal constraints on DB1 first; when there are none, columns named
/// `<table>_id`, `<table>Id` or `<table>_ID` in the same schema.
pub async fn discover_row_candidates(
    db1: &dyn DataAccess,
    schema: &str,
    table: &str,
) -> Result<Vec<ReferencingColumn>> {
    let formal = db1.get_constraints_targeting_table(schema, table).await?;
    if !formal.is_empty() {
        return Ok(formal);
    }

    let mut candidates = Vec::new();
    for pattern in naming_patterns(table) {
        match db1.find_columns_named(schema, &pattern, table).await {
            Ok(found) => candidates.extend(found),
            Err(e) => debug!("column search for {} failed: {}", pattern, e),
        }
    }
    Ok(union_constraints(candidates, Vec::new()))
}

/// Column names conventionally used to reference `table`.
pub fn naming_patterns(table: &str) -> [String; 3] {
    [
        format!("{}_id", table),
        format!("{}Id", table),
        format!("{}_ID", table),
    ]
}

/// Probe one candidate on both sides. `None` when either probe fails.
pub async fn probe_candidate(
    column: &ReferencingColumn,
    target_id: &str,
    sample_limit: usize,
    db1: &dyn DataAccess,
    db2: &dyn DataAccess,
) -> Option<ReferencingTable> {
    let (probe1, probe2) = tokio::join!(
        db1.probe_value(
            &column.schema,
            &column.table_name,
            &column.column_name,
            target_id,
            sample_limit,
        ),
        db2.probe_value(
            &column.schema,
            &column.table_name,
            &column.column_name,
            target_id,
            sample_limit,
        ),
    );

    let (probe1, probe2) = match (probe1, probe2) {
        (Ok(p1), Ok(p2)) => (p1, p2),
        (r1, r2) => {
            debug!(
                "skipping {}: probe failed (DB1 ok={}, DB2 ok={})",
                column.constraint_name,
                r1.is_ok(),
                r2.is_ok()
            );
            return None;
        }
    };

    Some(ReferencingTable {
        schema: column.schema.clone(),
        table_name: column.table_name.clone(),
        column_name: column.column_name.clone(),
        constraint_name: column.constraint_name.clone(),
        matches_db1: probe1.count,
        matches_db2: probe2.count,
        sample_rows: probe1.samples.iter().map(SqlValue::canonical).collect(),
    })
}

/// Corrective script for `schema.table` built from one side's catalog.
///
/// The delete uses the table's first primary key column, or `id` when the
/// schema cannot be read or declares none.
pub async fn generate_corrective_script(
    db: &dyn DataAccess,
    schema: &str,
    table: &str,
    old_id: &str,
    new_id: &str,
) -> Result<String> {
    let constraints = db.get_constraints_targeting_table(schema, table).await?;
    let pk_column = match db.get_schema(schema, table).await {
        Ok(table_schema) => table_schema.primary_key_columns().into_iter().next(),
        Err(e) => {
            debug!("primary key lookup for {}.{} failed: {}", schema, table, e);
            None
        }
    }
    .unwrap_or_else(|| "id".to_string());

    debug!(
        "{} constraints reference {}.{}, deleting by {}",
        constraints.len(),
        schema,
        table,
        pk_column
    );
    Ok(render_corrective_script(
        schema,
        table,
        &pk_column,
        old_id,
        new_id,
        &constraints,
        Utc::now(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<SqlValue> {
        values.iter().map(|v| SqlValue::Int(*v)).collect()
    }

    #[test]
    fn test_categorize_values() {
        let (common, only1, only2) = categorize_values(&ints(&[1, 2, 3, 2]), &ints(&[3, 4, 1, 4]));
        assert_eq!(common, ints(&[1, 3]));
        assert_eq!(only1, ints(&[2]));
        assert_eq!(only2, ints(&[4]));
    }

    #[test]
    fn test_categorize_uses_canonical_strings() {
        let (common, only1, only2) =
            categorize_values(&[SqlValue::Int(5)], &[SqlValue::Text("5".into())]);
        assert_eq!(common, vec![SqlValue::Int(5)]);
        assert!(only1.is_empty());
        assert!(only2.is_empty());
    }

    #[test]
    fn test_union_keeps_first_side() {
        let a = vec![ReferencingColumn::new("public", "orders", "user_id", "fk_a")];
        let b = vec![
            ReferencingColumn::new("public", "orders", "user_id", "fk_b"),
            ReferencingColumn::new("public", "invoices", "user_id", "fk_c"),
        ];
        let merged = union_constraints(a, b);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].constraint_name, "fk_a");
        assert_eq!(merged[1].table_name, "invoices");
    }

    #[test]
    fn test_report_totals() {
        let col = ReferencingColumn::new("public", "orders", "user_id", "fk");
        let mut r = ReferenceMatch::empty(&col);
        r.db1_references = ints(&[1, 2]);
        r.db2_references = ints(&[2]);
        let report = ReferenceReport::new("public", "users", "id").with_references(vec![r]);
        assert_eq!(report.referencing_tables, 1);
        assert_eq!(report.total_references, 3);
    }

    #[test]
    fn test_naming_patterns() {
        assert_eq!(
            naming_patterns("users"),
            ["users_id".to_string(), "usersId".into(), "users_ID".into()]
        );
    }
}
