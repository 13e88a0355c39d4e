//! Core abstractions for database-agnostic comparison.
//!
//! - [`value`]: SQL value representation with typed equality
//! - [`row`]: Row container and row sets
//! - [`schema`]: Table, column and constraint metadata types
//! - [`traits`]: The [`DataAccess`] seam every database side implements
//! - [`memory`]: In-process `DataAccess` for tests and fixtures

pub mod memory;
pub mod row;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use memory::MemoryDatabase;
pub use row::{Row, RowSet};
pub use schema::{ColumnMetadata, ForeignKey, ReferencingColumn, TableSchema, ValueProbe};
pub use traits::DataAccess;
pub use value::SqlValue;
