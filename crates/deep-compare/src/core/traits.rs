//! Core traits for the comparison engine.
//!
//! - [`DataAccess`]: reads rows, schema and constraint metadata from one database side
//!
//! The comparison engine, orchestrator and reference analyzer only ever talk
//! to a database through this trait, so the same code runs against
//! PostgreSQL ([`PgDatabase`](crate::postgres::PgDatabase)) and against
//! in-process tables ([`MemoryDatabase`](super::memory::MemoryDatabase)).

use async_trait::async_trait;

use crate::error::Result;

use super::row::RowSet;
use super::schema::{ReferencingColumn, TableSchema, ValueProbe};
use super::value::SqlValue;

/// Read access to one side of a comparison.
///
/// Implementations must tolerate overlapping calls from several tasks; the
/// orchestrator issues the schema fetch and the data fetch against the same
/// side at the same time.
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Check that a table exists.
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool>;

    /// Load column and foreign key metadata for a table.
    async fn get_schema(&self, schema: &str, table: &str) -> Result<TableSchema>;

    /// Fetch every row of a table.
    async fn get_all_rows(&self, schema: &str, table: &str) -> Result<RowSet>;

    /// Fetch rows whose `column` equals any of `values`.
    async fn get_rows_by_column_values(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        values: &[SqlValue],
    ) -> Result<RowSet>;

    /// Foreign key constraints whose target is `schema.table.column`.
    async fn get_referencing_constraints(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<Vec<ReferencingColumn>>;

    /// Foreign key constraints targeting any column of `schema.table`.
    async fn get_constraints_targeting_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ReferencingColumn>>;

    /// Columns named exactly `column` in `schema`, skipping `exclude_table`.
    ///
    /// Returned entries carry synthesized constraint names.
    async fn find_columns_named(
        &self,
        schema: &str,
        column: &str,
        exclude_table: &str,
    ) -> Result<Vec<ReferencingColumn>>;

    /// Distinct non-null values of a column, in fetch order.
    async fn get_distinct_column_values(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<Vec<SqlValue>>;

    /// Count rows whose `column` equals `value` and collect up to `limit` samples.
    async fn probe_value(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        value: &str,
        limit: usize,
    ) -> Result<ValueProbe>;

    /// Check connectivity.
    async fn ping(&self) -> Result<()>;

    /// Short identifier for logs (e.g., "postgres", "memory").
    fn db_type(&self) -> &str;
}
