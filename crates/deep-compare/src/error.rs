//! Error types for the comparison library.

use std::fmt;

use thiserror::Error;

/// Which database a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Db1,
    Db2,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Db1 => write!(f, "DB1"),
            Side::Db2 => write!(f, "DB2"),
        }
    }
}

/// Main error type for comparison operations.
#[derive(Error, Debug)]
pub enum CompareError {
    /// Configuration error (invalid YAML, missing fields, bad env values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Query error reported by PostgreSQL
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Target table is missing on one side
    #[error("table {table} does not exist in {side}")]
    TableNotFound { table: String, side: Side },

    /// Schema could not be read
    #[error("Schema fetch failed: {0}")]
    Schema(String),

    /// Row or value fetch failed on one side
    #[error("{side} fetch error: {message}")]
    Fetch { side: Side, message: String },

    /// An aggregate wait ran out of time
    #[error("{operation} timeout after {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    /// IO error (report files, exclude-column files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompareError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl fmt::Display, context: impl Into<String>) -> Self {
        CompareError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Fetch error for one side
    pub fn fetch(side: Side, message: impl Into<String>) -> Self {
        CompareError::Fetch {
            side,
            message: message.into(),
        }
    }

    /// Create a Timeout error
    pub fn timeout(operation: impl Into<String>, elapsed: std::time::Duration) -> Self {
        CompareError::Timeout {
            operation: operation.into(),
            elapsed_secs: elapsed.as_secs(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            CompareError::Config(_) | CompareError::Yaml(_) => 2,
            CompareError::TableNotFound { .. } => 3,
            CompareError::Timeout { .. } => 4,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for comparison operations.
pub type Result<T> = std::result::Result<T, CompareError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_table_not_found_message() {
        let err = CompareError::TableNotFound {
            table: "public.orders".into(),
            side: Side::Db2,
        };
        assert_eq!(err.to_string(), "table public.orders does not exist in DB2");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_timeout_message() {
        let err = CompareError::timeout("FK analysis", Duration::from_secs(120));
        assert_eq!(err.to_string(), "FK analysis timeout after 120s");
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = CompareError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: missing"));
    }
}
