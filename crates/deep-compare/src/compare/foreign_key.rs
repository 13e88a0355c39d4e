//! Reconciliation of the rows referenced through a foreign key.

use std::collections::HashSet;
use std::fmt::Display;

use tracing::{debug, warn};

use crate::core::{DataAccess, ForeignKey, Row, SqlValue};

use super::criteria::ResolvedCriteria;
use super::matcher::DuplicatePolicy;
use super::reconcile;
use super::types::{ForeignKeyReference, ForeignKeyResult};

/// Distinct non-null values of `column` across both row sets, first-seen order.
pub fn distinct_values(column: &str, rows_a: &[Row], rows_b: &[Row]) -> Vec<SqlValue> {
    let mut seen = HashSet::new();
    rows_a
        .iter()
        .chain(rows_b.iter())
        .filter_map(|row| row.get(column))
        .filter(|v| !v.is_null())
        .filter(|v| seen.insert(v.typed_key()))
        .cloned()
        .collect()
}

/// Criteria for the table a foreign key points at.
///
/// Built from DB1's schema of the referenced table; falls back to the
/// caller's criteria when that schema cannot be read.
pub async fn referenced_criteria(
    db1: &dyn DataAccess,
    fk: &ForeignKey,
    parent: &ResolvedCriteria,
) -> ResolvedCriteria {
    match db1
        .get_schema(&fk.referenced_schema, &fk.referenced_table)
        .await
    {
        Ok(schema) => parent.for_referenced_table(&schema),
        Err(e) => {
            warn!(
                "{}: could not read schema of {}, using caller criteria: {}",
                fk.constraint_name,
                fk.referenced_full_name(),
                e
            );
            parent.clone()
        }
    }
}

/// Compare the rows referenced by `fk` from both sides.
///
/// `criteria` are the referenced table's criteria and are used for both
/// matching and diffing. A fetch failure on either side yields a result
/// holding only the error.
pub async fn reconcile_foreign_key(
    fk: &ForeignKey,
    rows_a: &[Row],
    rows_b: &[Row],
    db1: &dyn DataAccess,
    db2: &dyn DataAccess,
    criteria: &ResolvedCriteria,
    policy: DuplicatePolicy,
) -> ForeignKeyResult {
    let values = distinct_values(&fk.column_name, rows_a, rows_b);
    debug!(
        "{}: reconciling {} distinct values against {}",
        fk.constraint_name,
        values.len(),
        fk.referenced_full_name()
    );

    let (data1, data2) = if values.is_empty() {
        (Ok(Vec::new()), Ok(Vec::new()))
    } else {
        tokio::join!(
            db1.get_rows_by_column_values(
                &fk.referenced_schema,
                &fk.referenced_table,
                &fk.referenced_column,
                &values,
            ),
            db2.get_rows_by_column_values(
                &fk.referenced_schema,
                &fk.referenced_table,
                &fk.referenced_column,
                &values,
            ),
        )
    };

    let (ref1, ref2) = match (data1, data2) {
        (Ok(r1), Ok(r2)) => (r1, r2),
        (r1, r2) => {
            let message = format!(
                "Error getting foreign key data: DB1={}, DB2={}",
                nil_or(r1.err()),
                nil_or(r2.err())
            );
            warn!("{}: {}", fk.constraint_name, message);
            return ForeignKeyResult::failed(fk.clone(), message);
        }
    };

    let reconciled = reconcile(
        &fk.referenced_schema,
        &fk.referenced_table,
        &ref1,
        &ref2,
        criteria,
        &[],
        policy,
    );

    let mut fk_references: Vec<ForeignKeyReference> = reconciled
        .matches
        .into_iter()
        .map(|m| ForeignKeyReference {
            foreign_key: fk.clone(),
            db1_referenced: Some(m.pair.db1),
            db2_referenced: Some(m.pair.db2),
            referenced_diff: m.differs,
        })
        .collect();

    let result = reconciled.result;
    fk_references.extend(result.only_in_db1.iter().map(|row| ForeignKeyReference {
        foreign_key: fk.clone(),
        db1_referenced: Some(row.clone()),
        db2_referenced: None,
        referenced_diff: true,
    }));
    fk_references.extend(result.only_in_db2.iter().map(|row| ForeignKeyReference {
        foreign_key: fk.clone(),
        db1_referenced: None,
        db2_referenced: Some(row.clone()),
        referenced_diff: true,
    }));

    ForeignKeyResult {
        foreign_key: fk.clone(),
        comparison_result: result,
        error: None,
        fk_references,
    }
}

fn nil_or<E: Display>(err: Option<E>) -> String {
    err.map(|e| e.to_string())
        .unwrap_or_else(|| "<nil>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MemoryDatabase, TableSchema};
    use crate::error::Side;
    use serde_json::json;

    fn fk() -> ForeignKey {
        ForeignKey::new("user_id", "public", "users", "id", "orders_user_id_fkey")
    }

    #[test]
    fn test_distinct_values_first_seen() {
        let a = vec![
            Row::from_json(json!({"user_id": 7})),
            Row::from_json(json!({"user_id": null})),
            Row::from_json(json!({"user_id": 8})),
        ];
        let b = vec![
            Row::from_json(json!({"user_id": 8})),
            Row::from_json(json!({"user_id": "7"})),
        ];
        let values = distinct_values("user_id", &a, &b);
        assert_eq!(
            values,
            vec![SqlValue::Int(7), SqlValue::Int(8), SqlValue::Text("7".into())]
        );
    }

    #[tokio::test]
    async fn test_referenced_row_missing_on_db2() {
        let users = vec![Row::from_json(json!({"id": 7, "name": "ann"}))];
        let db1 = MemoryDatabase::new(Side::Db1).with_rows("public", "users", users);
        let db2 = MemoryDatabase::new(Side::Db2).with_rows("public", "users", vec![]);
        let orders = vec![Row::from_json(json!({"id": 1, "user_id": 7}))];

        let result = reconcile_foreign_key(
            &fk(),
            &orders,
            &orders,
            &db1,
            &db2,
            &ResolvedCriteria::excluding(&["id"]),
            DuplicatePolicy::LastWins,
        )
        .await;

        assert!(result.error.is_none());
        assert_eq!(result.comparison_result.only_in_db1.len(), 1);
        assert_eq!(result.comparison_result.matched_rows, 0);
        assert_eq!(result.fk_references.len(), 1);
        assert!(result.fk_references[0].referenced_diff);
        assert!(result.fk_references[0].db2_referenced.is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_reports_both_sides() {
        let db1 = MemoryDatabase::new(Side::Db1)
            .with_rows("public", "users", vec![])
            .failing_table("public", "users");
        let db2 = MemoryDatabase::new(Side::Db2).with_rows("public", "users", vec![]);
        let orders = vec![Row::from_json(json!({"user_id": 7}))];

        let result = reconcile_foreign_key(
            &fk(),
            &orders,
            &orders,
            &db1,
            &db2,
            &ResolvedCriteria::default(),
            DuplicatePolicy::LastWins,
        )
        .await;

        let error = result.error.unwrap();
        assert!(error.starts_with("Error getting foreign key data: DB1="));
        assert!(error.ends_with("DB2=<nil>"));
        assert!(result.fk_references.is_empty());
        assert_eq!(result.comparison_result.table_name, "users");
    }

    #[tokio::test]
    async fn test_referenced_criteria_excludes_referenced_pk() {
        let mut users = TableSchema::new("public", "users");
        users.columns = vec![
            crate::core::ColumnMetadata::new("id", "integer").primary_key(),
            crate::core::ColumnMetadata::new("name", "text"),
        ];
        let db1 = MemoryDatabase::new(Side::Db1).with_table(users, vec![]);

        let parent = ResolvedCriteria::excluding(&["amount"]);
        let criteria = referenced_criteria(&db1, &fk(), &parent).await;
        assert!(criteria.is_excluded("id"));
        assert!(!criteria.is_excluded("amount"));

        let missing = MemoryDatabase::new(Side::Db1);
        let fallback = referenced_criteria(&missing, &fk(), &parent).await;
        assert_eq!(fallback, parent);
    }
}
