//! In-process [`DataAccess`] implementation.
//!
//! `MemoryDatabase` holds tables as plain [`RowSet`]s and derives constraint
//! metadata from the foreign keys declared on those tables. It backs the
//! integration tests and dry runs against fixture files, and supports
//! injected fetch failures and delays for exercising timeout paths.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CompareError, Result, Side};

use super::row::{Row, RowSet};
use super::schema::{ColumnMetadata, ReferencingColumn, TableSchema, ValueProbe};
use super::traits::DataAccess;
use super::value::SqlValue;

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: RowSet,
}

/// In-memory database side.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    side: Side,
    tables: Vec<MemoryTable>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    unreachable: bool,
}

impl MemoryDatabase {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            tables: Vec::new(),
            failing: HashSet::new(),
            delays: HashMap::new(),
            unreachable: false,
        }
    }

    /// Add a table with explicit metadata.
    ///
    /// When the schema has no columns, they are inferred from the rows as
    /// nullable `text` columns.
    #[must_use]
    pub fn with_table(mut self, mut schema: TableSchema, rows: RowSet) -> Self {
        if schema.columns.is_empty() {
            schema.columns = infer_columns(&rows);
        }
        let name = schema.full_name();
        self.tables.retain(|t| t.schema.full_name() != name);
        self.tables.push(MemoryTable { schema, rows });
        self
    }

    /// Add a table with metadata inferred from its rows.
    #[must_use]
    pub fn with_rows(self, schema: &str, table: &str, rows: RowSet) -> Self {
        self.with_table(TableSchema::new(schema, table), rows)
    }

    /// Make every row fetch against `schema.table` fail.
    #[must_use]
    pub fn failing_table(mut self, schema: &str, table: &str) -> Self {
        self.failing.insert(format!("{}.{}", schema, table));
        self
    }

    /// Delay every row fetch against `schema.table`.
    #[must_use]
    pub fn delayed_table(mut self, schema: &str, table: &str, delay: Duration) -> Self {
        self.delays.insert(format!("{}.{}", schema, table), delay);
        self
    }

    /// Make `ping` and all catalog calls fail.
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    fn find(&self, schema: &str, table: &str) -> Option<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.schema.schema == schema && t.schema.table == table)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable {
            return Err(CompareError::pool(
                "connection refused",
                format!("{} memory database", self.side),
            ));
        }
        Ok(())
    }

    /// Foreign keys on any table pointing at `schema.table`, with the referenced column.
    fn targeting(&self, schema: &str, table: &str) -> Vec<(ReferencingColumn, &str)> {
        let mut found: Vec<(ReferencingColumn, &str)> = self
            .tables
            .iter()
            .flat_map(|t| {
                t.schema
                    .foreign_keys
                    .iter()
                    .filter(|fk| fk.referenced_schema == schema && fk.referenced_table == table)
                    .map(|fk| {
                        (
                            ReferencingColumn::new(
                                &t.schema.schema,
                                &t.schema.table,
                                &fk.column_name,
                                &fk.constraint_name,
                            ),
                            fk.referenced_column.as_str(),
                        )
                    })
            })
            .collect();
        found.sort_by(|a, b| a.0.location().cmp(&b.0.location()));
        found
    }

    async fn rows_for(&self, schema: &str, table: &str) -> Result<&RowSet> {
        self.check_reachable()?;
        let name = format!("{}.{}", schema, table);
        if let Some(delay) = self.delays.get(&name) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&name) {
            return Err(CompareError::fetch(
                self.side,
                format!("injected failure reading {}", name),
            ));
        }
        self.find(schema, table)
            .map(|t| &t.rows)
            .ok_or_else(|| CompareError::TableNotFound {
                table: name,
                side: self.side,
            })
    }
}

fn infer_columns(rows: &[Row]) -> Vec<ColumnMetadata> {
    let mut seen = Vec::<String>::new();
    for row in rows {
        for col in row.columns() {
            if !seen.iter().any(|c| c == col) {
                seen.push(col.to_string());
            }
        }
    }
    seen.into_iter()
        .map(|name| ColumnMetadata::new(name, "text"))
        .collect()
}

#[async_trait]
impl DataAccess for MemoryDatabase {
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        self.check_reachable()?;
        Ok(self.find(schema, table).is_some())
    }

    async fn get_schema(&self, schema: &str, table: &str) -> Result<TableSchema> {
        self.check_reachable()?;
        self.find(schema, table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| CompareError::Schema(format!("no table {}.{}", schema, table)))
    }

    async fn get_all_rows(&self, schema: &str, table: &str) -> Result<RowSet> {
        Ok(self.rows_for(schema, table).await?.clone())
    }

    async fn get_rows_by_column_values(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        values: &[SqlValue],
    ) -> Result<RowSet> {
        let wanted: HashSet<String> = values.iter().map(SqlValue::canonical).collect();
        let rows = self.rows_for(schema, table).await?;
        Ok(rows
            .iter()
            .filter(|row| {
                row.get(column)
                    .filter(|v| !v.is_null())
                    .is_some_and(|v| wanted.contains(&v.canonical()))
            })
            .cloned()
            .collect())
    }

    async fn get_referencing_constraints(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<Vec<ReferencingColumn>> {
        self.check_reachable()?;
        Ok(self
            .targeting(schema, table)
            .into_iter()
            .filter(|(_, target_column)| *target_column == column)
            .map(|(rc, _)| rc)
            .collect())
    }

    async fn get_constraints_targeting_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ReferencingColumn>> {
        self.check_reachable()?;
        Ok(self
            .targeting(schema, table)
            .into_iter()
            .map(|(rc, _)| rc)
            .collect())
    }

    async fn find_columns_named(
        &self,
        schema: &str,
        column: &str,
        exclude_table: &str,
    ) -> Result<Vec<ReferencingColumn>> {
        self.check_reachable()?;
        Ok(self
            .tables
            .iter()
            .filter(|t| t.schema.schema == schema && t.schema.table != exclude_table)
            .filter(|t| t.schema.columns.iter().any(|c| c.name == column))
            .map(|t| ReferencingColumn::inferred(schema, &t.schema.table, column))
            .collect())
    }

    async fn get_distinct_column_values(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<Vec<SqlValue>> {
        let rows = self.rows_for(schema, table).await?;
        let mut seen = HashSet::new();
        Ok(rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter(|v| !v.is_null())
            .filter(|v| seen.insert(v.typed_key()))
            .cloned()
            .collect())
    }

    async fn probe_value(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        value: &str,
        limit: usize,
    ) -> Result<ValueProbe> {
        let rows = self.rows_for(schema, table).await?;
        let matching: Vec<&SqlValue> = rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter(|v| !v.is_null() && v.canonical() == value)
            .collect();
        Ok(ValueProbe {
            count: matching.len() as u64,
            samples: matching.into_iter().take(limit).cloned().collect(),
        })
    }

    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ForeignKey;
    use serde_json::json;

    fn sample() -> MemoryDatabase {
        let mut orders = TableSchema::new("public", "orders");
        orders.foreign_keys = vec![ForeignKey::new(
            "user_id",
            "public",
            "users",
            "id",
            "orders_user_id_fkey",
        )];
        MemoryDatabase::new(Side::Db1)
            .with_rows(
                "public",
                "users",
                vec![
                    Row::from_json(json!({"id": 7, "name": "ann"})),
                    Row::from_json(json!({"id": 8, "name": "bob"})),
                ],
            )
            .with_table(
                orders,
                vec![
                    Row::from_json(json!({"id": 1, "user_id": 7})),
                    Row::from_json(json!({"id": 2, "user_id": 7})),
                    Row::from_json(json!({"id": 3, "user_id": null})),
                ],
            )
    }

    #[tokio::test]
    async fn test_rows_by_values_and_distinct() {
        let db = sample();
        let rows = db
            .get_rows_by_column_values("public", "users", "id", &[SqlValue::Int(7)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let values = db
            .get_distinct_column_values("public", "orders", "user_id")
            .await
            .unwrap();
        assert_eq!(values, vec![SqlValue::Int(7)]);
    }

    #[tokio::test]
    async fn test_constraints_derived_from_foreign_keys() {
        let db = sample();
        let refs = db
            .get_referencing_constraints("public", "users", "id")
            .await
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].table_name, "orders");

        let none = db
            .get_referencing_constraints("public", "users", "name")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_probe_counts_and_limits_samples() {
        let db = sample();
        let probe = db
            .probe_value("public", "orders", "user_id", "7", 1)
            .await
            .unwrap();
        assert_eq!(probe.count, 2);
        assert_eq!(probe.samples.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let db = sample().failing_table("public", "users");
        let err = db.get_all_rows("public", "users").await.unwrap_err();
        assert!(matches!(err, CompareError::Fetch { side: Side::Db1, .. }));
        assert!(db.get_all_rows("public", "orders").await.is_ok());
    }
}
