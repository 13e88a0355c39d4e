//! Schema and constraint metadata for compared tables.
//!
//! These types are the database-agnostic view of what the catalog reports
//! about a table: its columns, its outgoing foreign keys, and the columns
//! elsewhere that point back at it.

use serde::{Deserialize, Serialize};

use super::value::SqlValue;

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Column name.
    #[serde(rename = "column_name")]
    pub name: String,

    /// Declared data type (e.g., "integer", "character varying", "uuid").
    pub data_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is part of the primary key.
    #[serde(rename = "is_primary")]
    pub is_primary_key: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_primary_key: false,
        }
    }

    /// Mark this column as a non-null primary key column.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }
}

/// Foreign key from a source column to a referenced table's column.
///
/// The constraint name is either the catalog name or, for relationships
/// inferred from column naming, `potential_fk_<schema>_<table>_<column>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Column on the source table.
    pub column_name: String,

    /// Referenced schema.
    pub referenced_schema: String,

    /// Referenced table.
    pub referenced_table: String,

    /// Referenced column.
    #[serde(rename = "referenced_column_name")]
    pub referenced_column: String,

    /// Constraint name.
    pub constraint_name: String,
}

impl ForeignKey {
    pub fn new(
        column_name: impl Into<String>,
        referenced_schema: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
        constraint_name: impl Into<String>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            referenced_schema: referenced_schema.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
            constraint_name: constraint_name.into(),
        }
    }

    /// Get the fully qualified referenced table name.
    pub fn referenced_full_name(&self) -> String {
        format!("{}.{}", self.referenced_schema, self.referenced_table)
    }
}

/// Table metadata as read from one side's catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Schema name.
    pub schema: String,

    /// Table name.
    #[serde(rename = "table_name")]
    pub table: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<ColumnMetadata>,

    /// Outgoing foreign keys in declaration order.
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            ..Default::default()
        }
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Names of the primary key columns.
    pub fn primary_key_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect()
    }
}

/// A column somewhere in the database that points at a target table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferencingColumn {
    /// Schema of the referencing table.
    pub schema: String,

    /// Referencing table.
    pub table_name: String,

    /// Referencing column.
    pub column_name: String,

    /// Constraint name (catalog or synthesized).
    pub constraint_name: String,
}

impl ReferencingColumn {
    pub fn new(
        schema: impl Into<String>,
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        constraint_name: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table_name: table_name.into(),
            column_name: column_name.into(),
            constraint_name: constraint_name.into(),
        }
    }

    /// Pseudo-constraint for a column matched only by naming convention.
    pub fn inferred(
        schema: impl Into<String>,
        table_name: impl Into<String>,
        column_name: impl Into<String>,
    ) -> Self {
        let schema = schema.into();
        let table_name = table_name.into();
        let column_name = column_name.into();
        let constraint_name = format!("potential_fk_{}_{}_{}", schema, table_name, column_name);
        Self {
            schema,
            table_name,
            column_name,
            constraint_name,
        }
    }

    /// Identity used to union constraints discovered on both sides.
    pub fn location(&self) -> (&str, &str, &str) {
        (&self.schema, &self.table_name, &self.column_name)
    }

    /// Get the fully qualified referencing table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table_name)
    }
}

/// Result of probing a column for a specific value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueProbe {
    /// Number of rows whose column equals the value.
    pub count: u64,

    /// Up to `limit` matching values.
    pub samples: Vec<SqlValue>,
}
