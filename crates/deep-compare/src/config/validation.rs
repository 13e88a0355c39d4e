//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::error::{CompareError, Result};
use crate::postgres::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("database1", &config.database1)?;
    validate_database("database2", &config.database2)?;

    // Comparing a database with itself is always a mistake
    if config.database1.host == config.database2.host
        && config.database1.port == config.database2.port
        && config.database1.database == config.database2.database
    {
        return Err(CompareError::Config(
            "database1 and database2 cannot be the same database".into(),
        ));
    }

    let compare = &config.compare;
    if compare.max_workers == 0 {
        return Err(CompareError::Config(
            "compare.max_workers must be at least 1".into(),
        ));
    }
    for (name, secs) in [
        ("fetch_timeout_secs", compare.fetch_timeout_secs),
        ("fk_job_timeout_secs", compare.fk_job_timeout_secs),
        ("fk_total_timeout_secs", compare.fk_total_timeout_secs),
        ("reference_timeout_secs", compare.reference_timeout_secs),
    ] {
        if secs == 0 {
            return Err(CompareError::Config(format!(
                "compare.{} must be greater than 0",
                name
            )));
        }
    }

    Ok(())
}

fn validate_database(section: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(CompareError::Config(format!("{}.host is required", section)));
    }
    if db.database.is_empty() {
        return Err(CompareError::Config(format!(
            "{}.database is required",
            section
        )));
    }
    if db.user.is_empty() {
        return Err(CompareError::Config(format!("{}.user is required", section)));
    }
    if let Err(CompareError::Config(msg)) = db.ssl_mode.parse::<SslMode>() {
        return Err(CompareError::Config(format!("{}: {}", section, msg)));
    }
    if db.max_connections == 0 {
        return Err(CompareError::Config(format!(
            "{}.max_connections must be at least 1",
            section
        )));
    }
    Ok(())
}
