//! Row reconciliation engine.
//!
//! Rows are paired by a derived matching key ([`key`]), partitioned into
//! matched and one-sided rows ([`matcher`]), and matched pairs are diffed
//! column by column ([`differ`]). The same [`reconcile`] function runs for
//! the target table and for every table reached through a foreign key
//! ([`foreign_key`]).

pub mod criteria;
pub mod differ;
pub mod foreign_key;
pub mod key;
pub mod matcher;
pub mod types;

pub use criteria::{load_exclude_columns, ExclusionSet, MatchCriteria, ResolvedCriteria};
pub use differ::{attach_references, diff_rows};
pub use foreign_key::{reconcile_foreign_key, referenced_criteria};
pub use key::derive_key;
pub use matcher::{match_rows, DuplicatePolicy, MatchOutcome, RowMatch};
pub use types::{
    ColumnDifference, ComparisonResult, ForeignKeyReference, ForeignKeyResult, RowDifference,
};

use crate::core::{ForeignKey, Row};

/// A matched pair and whether it produced a [`RowDifference`].
#[derive(Debug, Clone)]
pub struct ReconciledMatch {
    pub pair: RowMatch,
    pub differs: bool,
}

/// Output of [`reconcile`].
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Counts, one-sided rows and differences. Foreign key results are empty.
    pub result: ComparisonResult,
    pub matches: Vec<ReconciledMatch>,
}

/// Match two row sets and diff every matched pair.
pub fn reconcile(
    schema: &str,
    table: &str,
    rows_a: &[Row],
    rows_b: &[Row],
    criteria: &ResolvedCriteria,
    foreign_keys: &[ForeignKey],
    policy: DuplicatePolicy,
) -> Reconciliation {
    let outcome = match_rows(rows_a, rows_b, criteria, policy);

    let mut result = ComparisonResult::new(schema, table);
    result.total_rows_db1 = rows_a.len();
    result.total_rows_db2 = rows_b.len();
    result.matched_rows = outcome.matches.len();
    result.unmatched_rows = outcome.only_a.len() + outcome.only_b.len();
    result.only_in_db1 = outcome.only_a;
    result.only_in_db2 = outcome.only_b;

    let mut matches = Vec::with_capacity(outcome.matches.len());
    for pair in outcome.matches {
        let mut diff = diff_rows(&pair.db1, &pair.db2, &criteria.exclusions, foreign_keys);
        let differs = diff.has_differences();
        if differs {
            diff.row_identifier = pair.key.clone();
            result.differences.push(diff);
        }
        matches.push(ReconciledMatch { pair, differs });
    }

    Reconciliation { result, matches }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: serde_json::Value) -> Vec<Row> {
        values
            .as_array()
            .map(|arr| arr.iter().cloned().map(Row::from_json).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_diverging_ids_still_match() {
        let a = rows(json!([{"id": 1, "user_id": 7, "amount": 10}]));
        let b = rows(json!([{"id": 99, "user_id": 7, "amount": 10}]));
        let criteria = ResolvedCriteria::excluding(&["id"]);
        let out = reconcile("public", "orders", &a, &b, &criteria, &[], DuplicatePolicy::LastWins);

        assert_eq!(out.result.matched_rows, 1);
        assert!(out.result.differences.is_empty());
        assert!(!out.matches[0].differs);
    }

    #[test]
    fn test_changed_value_matched_on_id() {
        let a = rows(json!([{"id": 1, "amount": 10}]));
        let b = rows(json!([{"id": 1, "amount": 12}]));
        let criteria = ResolvedCriteria::new(vec!["id".into()], &[], Vec::new(), false);
        let out = reconcile("public", "orders", &a, &b, &criteria, &[], DuplicatePolicy::LastWins);

        assert_eq!(out.result.matched_rows, 1);
        assert_eq!(out.result.differences.len(), 1);
        let diff = &out.result.differences[0].column_differences;
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].column_name, "amount");
        assert_eq!(diff[0].db1_value, crate::core::SqlValue::Int(10));
        assert_eq!(diff[0].db2_value, crate::core::SqlValue::Int(12));
    }

    #[test]
    fn test_difference_carries_match_key() {
        let a = rows(json!([{"code": "A", "amount": 10}]));
        let b = rows(json!([{"code": "A", "amount": 12}]));
        let criteria = ResolvedCriteria::new(vec!["code".into()], &[], Vec::new(), false);
        let out = reconcile("public", "t", &a, &b, &criteria, &[], DuplicatePolicy::LastWins);

        assert_eq!(out.result.differences.len(), 1);
        assert_eq!(out.result.differences[0].row_identifier, "code:A");
        assert_eq!(out.result.unmatched_rows, 0);
    }
}
