//! Comparison result types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{ForeignKey, Row, RowSet, SqlValue};

/// A single column that differs between a matched pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDifference {
    pub column_name: String,

    /// DB1 value, `Null` when the column is absent.
    pub db1_value: SqlValue,

    /// DB2 value, `Null` when the column is absent.
    pub db2_value: SqlValue,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_foreign_key: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key_reference: Option<ForeignKeyReference>,
}

/// The rows a foreign key value resolves to on each side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyReference {
    pub foreign_key: ForeignKey,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub db1_referenced: Option<Row>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub db2_referenced: Option<Row>,

    pub referenced_diff: bool,
}

/// A matched pair with at least one differing column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDifference {
    /// Matching key of the pair.
    pub row_identifier: String,
    pub db1_row: Row,
    pub db2_row: Row,
    pub column_differences: Vec<ColumnDifference>,
}

impl RowDifference {
    pub fn has_differences(&self) -> bool {
        !self.column_differences.is_empty()
    }
}

/// Outcome of reconciling the rows referenced by one foreign key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyResult {
    pub foreign_key: ForeignKey,
    pub comparison_result: ComparisonResult,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fk_references: Vec<ForeignKeyReference>,
}

impl ForeignKeyResult {
    /// Result carrying only an error, with an empty comparison for the referenced table.
    pub fn failed(foreign_key: ForeignKey, error: impl Into<String>) -> Self {
        let comparison_result =
            ComparisonResult::new(&foreign_key.referenced_schema, &foreign_key.referenced_table);
        Self {
            foreign_key,
            comparison_result,
            error: Some(error.into()),
            fk_references: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Full comparison report for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub table_name: String,
    pub schema: String,
    pub timestamp: DateTime<Utc>,
    pub total_rows_db1: usize,
    pub total_rows_db2: usize,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
    pub only_in_db1: RowSet,
    pub only_in_db2: RowSet,
    pub differences: Vec<RowDifference>,
    pub foreign_key_results: Vec<ForeignKeyResult>,

    /// Aggregate failures (timeouts). Non-empty means the result is partial.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ComparisonResult {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            table_name: table.to_string(),
            schema: schema.to_string(),
            timestamp: Utc::now(),
            total_rows_db1: 0,
            total_rows_db2: 0,
            matched_rows: 0,
            unmatched_rows: 0,
            only_in_db1: Vec::new(),
            only_in_db2: Vec::new(),
            differences: Vec::new(),
            foreign_key_results: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Whether some part of the comparison did not complete.
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty() || self.foreign_key_results.iter().any(|r| r.is_error())
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
