//! Column-level diffs of matched rows.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::core::{DataAccess, ForeignKey, Row, SqlValue};

use super::criteria::{ExclusionSet, ResolvedCriteria};
use super::types::{ColumnDifference, ForeignKeyReference, RowDifference};

/// Compare two matched rows column by column.
///
/// Equality is typed. Byte values are turned into text in the output only.
/// Columns that are the source of a foreign key are flagged; their
/// referenced rows are attached later by [`attach_references`].
pub fn diff_rows(
    row_a: &Row,
    row_b: &Row,
    exclusions: &ExclusionSet,
    foreign_keys: &[ForeignKey],
) -> RowDifference {
    let columns: BTreeSet<&str> = row_a.columns().chain(row_b.columns()).collect();

    let column_differences = columns
        .into_iter()
        .filter(|col| !exclusions.contains(col))
        .filter_map(|col| {
            let a = row_a.get(col);
            let b = row_b.get(col);
            if a == b {
                return None;
            }
            Some(ColumnDifference {
                column_name: col.to_string(),
                db1_value: a.map(SqlValue::normalized).unwrap_or(SqlValue::Null),
                db2_value: b.map(SqlValue::normalized).unwrap_or(SqlValue::Null),
                is_foreign_key: foreign_keys.iter().any(|fk| fk.column_name == col),
                foreign_key_reference: None,
            })
        })
        .collect();

    RowDifference {
        row_identifier: String::new(),
        db1_row: row_a.clone(),
        db2_row: row_b.clone(),
        column_differences,
    }
}

/// Resolve the referenced rows for every foreign key column of a difference.
///
/// `referenced` holds the criteria for each referenced table, keyed by the
/// foreign key's source column; when missing the rows are compared whole.
pub async fn attach_references(
    diff: &mut RowDifference,
    db1: &dyn DataAccess,
    db2: &dyn DataAccess,
    foreign_keys: &[ForeignKey],
    referenced: &HashMap<String, ResolvedCriteria>,
) {
    for col_diff in diff.column_differences.iter_mut().filter(|c| c.is_foreign_key) {
        let Some(fk) = foreign_keys
            .iter()
            .find(|fk| fk.column_name == col_diff.column_name)
        else {
            continue;
        };
        let val1 = diff.db1_row.get(&fk.column_name).filter(|v| !v.is_null());
        let val2 = diff.db2_row.get(&fk.column_name).filter(|v| !v.is_null());
        let exclusions = referenced
            .get(&fk.column_name)
            .map(|c| c.exclusions.clone())
            .unwrap_or_default();

        col_diff.foreign_key_reference =
            resolve_reference(fk, val1, val2, db1, db2, &exclusions).await;
    }
}

/// Fetch the rows `val1` (DB1) and `val2` (DB2) point at and compare them.
///
/// Returns `None` when both values are null or both fetches fail.
pub async fn resolve_reference(
    fk: &ForeignKey,
    val1: Option<&SqlValue>,
    val2: Option<&SqlValue>,
    db1: &dyn DataAccess,
    db2: &dyn DataAccess,
    exclusions: &ExclusionSet,
) -> Option<ForeignKeyReference> {
    let mut values: Vec<SqlValue> = val1.into_iter().cloned().collect();
    if let Some(v) = val2 {
        if val1 != Some(v) {
            values.push(v.clone());
        }
    }
    if values.is_empty() {
        return None;
    }

    let (data1, data2) = tokio::join!(
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
    );

    if let (Err(e1), Err(e2)) = (&data1, &data2) {
        debug!(
            "{}: referenced rows unavailable (DB1={}, DB2={})",
            fk.constraint_name, e1, e2
        );
        return None;
    }

    let find = |rows: &[Row], value: Option<&SqlValue>| -> Option<Row> {
        let wanted = value?.canonical();
        rows.iter()
            .find(|row| {
                row.get(&fk.referenced_column)
                    .is_some_and(|v| v.canonical() == wanted)
            })
            .cloned()
    };

    let db1_referenced = data1.ok().and_then(|rows| find(&rows, val1));
    let db2_referenced = data2.ok().and_then(|rows| find(&rows, val2));

    let referenced_diff = match (&db1_referenced, &db2_referenced) {
        (Some(r1), Some(r2)) => diff_rows(r1, r2, exclusions, &[]).has_differences(),
        (None, None) => false,
        _ => true,
    };

    Some(ForeignKeyReference {
        foreign_key: fk.clone(),
        db1_referenced,
        db2_referenced,
        referenced_diff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_fk() -> ForeignKey {
        ForeignKey::new("user_id", "public", "users", "id", "orders_user_id_fkey")
    }

    #[test]
    fn test_identical_rows_have_no_differences() {
        let row = Row::from_json(json!({"id": 1, "amount": 10, "note": null}));
        let diff = diff_rows(&row, &row, &ExclusionSet::default(), &[]);
        assert!(!diff.has_differences());
    }

    #[test]
    fn test_excluded_columns_ignored() {
        let a = Row::from_json(json!({"id": 1, "amount": 10}));
        let b = Row::from_json(json!({"id": 2, "amount": 10}));
        let diff = diff_rows(&a, &b, &ExclusionSet::new(["id"]), &[]);
        assert!(!diff.has_differences());
    }

    #[test]
    fn test_value_and_presence_differences() {
        let a = Row::from_json(json!({"id": 1, "amount": 10, "extra": "x"}));
        let b = Row::from_json(json!({"id": 1, "amount": 12}));
        let diff = diff_rows(&a, &b, &ExclusionSet::new(["id"]), &[]);

        assert_eq!(diff.column_differences.len(), 2);
        let amount = &diff.column_differences[0];
        assert_eq!(amount.column_name, "amount");
        assert_eq!(amount.db1_value, SqlValue::Int(10));
        assert_eq!(amount.db2_value, SqlValue::Int(12));
        let extra = &diff.column_differences[1];
        assert_eq!(extra.db2_value, SqlValue::Null);
    }

    #[test]
    fn test_type_mismatch_is_a_difference() {
        let a = Row::new().with("code", 1);
        let b = Row::new().with("code", "1");
        let diff = diff_rows(&a, &b, &ExclusionSet::default(), &[]);
        assert_eq!(diff.column_differences.len(), 1);
    }

    #[test]
    fn test_bytes_normalized_in_output_only() {
        let a = Row::new().with("blob", b"abc".to_vec());
        let b = Row::new().with("blob", "abc");
        let diff = diff_rows(&a, &b, &ExclusionSet::default(), &[]);
        assert_eq!(diff.column_differences.len(), 1);
        assert_eq!(
            diff.column_differences[0].db1_value,
            SqlValue::Text("abc".into())
        );
    }

    #[test]
    fn test_foreign_key_columns_flagged() {
        let a = Row::from_json(json!({"user_id": 7}));
        let b = Row::from_json(json!({"user_id": 8}));
        let diff = diff_rows(&a, &b, &ExclusionSet::default(), &[user_fk()]);
        assert!(diff.column_differences[0].is_foreign_key);
    }
}
