//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compare::DuplicatePolicy;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// First database (the reference side).
    pub database1: DatabaseConfig,

    /// Second database.
    pub database2: DatabaseConfig,

    /// Comparison behavior configuration.
    #[serde(default)]
    pub compare: CompareConfig,

    /// Report output configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Connection settings for one PostgreSQL database.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host (default: "localhost").
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Connection pool size (default: 8).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_pg_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            ssl_mode: default_ssl_mode(),
            max_connections: default_max_connections(),
        }
    }
}

/// Concurrency, timeout and output-shaping settings of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Worker count for foreign key jobs and reference tasks (default: 4).
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Aggregate timeout for the initial three-way fetch (default: 60).
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Timeout of a single foreign key job (default: 30).
    #[serde(default = "default_fk_job_timeout")]
    pub fk_job_timeout_secs: u64,

    /// Aggregate timeout for all foreign key jobs (default: 120).
    #[serde(default = "default_fk_total_timeout")]
    pub fk_total_timeout_secs: u64,

    /// Aggregate timeout for reverse-reference tasks (default: 60).
    #[serde(default = "default_reference_timeout")]
    pub reference_timeout_secs: u64,

    /// Sample values kept per candidate in row reference analysis (default: 5).
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,

    /// Decode Base64-encoded UUID strings in reports (default: true).
    #[serde(default = "default_true")]
    pub decode_uuids: bool,

    /// How duplicate matching keys are handled (default: last_wins).
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            fetch_timeout_secs: default_fetch_timeout(),
            fk_job_timeout_secs: default_fk_job_timeout(),
            fk_total_timeout_secs: default_fk_total_timeout(),
            reference_timeout_secs: default_reference_timeout(),
            sample_limit: default_sample_limit(),
            decode_uuids: true,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl CompareConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn fk_job_timeout(&self) -> Duration {
        Duration::from_secs(self.fk_job_timeout_secs)
    }

    pub fn fk_total_timeout(&self) -> Duration {
        Duration::from_secs(self.fk_total_timeout_secs)
    }

    pub fn reference_timeout(&self) -> Duration {
        Duration::from_secs(self.reference_timeout_secs)
    }
}

/// Where reports are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory, created when missing (default: "generated").
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    /// File name of the comparison report (default: "comparison_result.json").
    #[serde(default = "default_output_file")]
    pub file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            file: default_output_file(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_connections() -> usize {
    8
}

fn default_max_workers() -> usize {
    4
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_fk_job_timeout() -> u64 {
    30
}

fn default_fk_total_timeout() -> u64 {
    120
}

fn default_reference_timeout() -> u64 {
    60
}

fn default_sample_limit() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_output_file() -> String {
    "comparison_result.json".to_string()
}
