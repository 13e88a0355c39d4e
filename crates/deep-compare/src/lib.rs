//! # deep-compare
//!
//! Row-level reconciliation of a table across two PostgreSQL databases.
//!
//! This library provides:
//!
//! - **Row matching** by a matching key derived from non-excluded columns,
//!   so rows still pair up when surrogate ids differ between databases
//! - **Column diffs** for matched rows, with the referenced rows attached
//!   for foreign key columns
//! - **Foreign key reconciliation** of every referenced table, run on a
//!   bounded worker pool with per-job and aggregate timeouts
//! - **Reference analysis** of the columns pointing at a table, column or
//!   single row, plus corrective SQL scripts for repointing a row's references
//!
//! ## Example
//!
//! ```rust,no_run
//! use deep_compare::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> deep_compare::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(&config).await?;
//!     let result = orchestrator.compare_table("public", "orders", None).await?;
//!     println!("{} matched, {} differing", result.matched_rows, result.differences.len());
//!     Ok(())
//! }
//! ```

pub mod compare;
pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod postgres;
pub mod references;
pub mod uuid_decode;

// Re-exports for convenient access
pub use compare::{ComparisonResult, DuplicatePolicy, MatchCriteria};
pub use config::{CompareConfig, Config, DatabaseConfig, OutputConfig};
pub use crate::core::{DataAccess, MemoryDatabase, Row, RowSet, SqlValue, TableSchema};
pub use error::{CompareError, Result, Side};
pub use orchestrator::{HealthReport, Orchestrator, WorkerPool};
pub use postgres::PgDatabase;
pub use references::{ReferenceAnalysisReport, ReferenceReport};
pub use uuid_decode::UuidDecoder;
