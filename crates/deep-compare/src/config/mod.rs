//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use tracing::debug;

use crate::error::{CompareError, Result};

impl Config {
    /// Load configuration from a YAML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from `DB1_*` and `DB2_*` environment variables alone.
    pub fn from_env() -> Result<Self> {
        let mut config = Config {
            database1: DatabaseConfig::default(),
            database2: DatabaseConfig::default(),
            compare: CompareConfig::default(),
            output: OutputConfig::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when it exists, otherwise fall back to [`Config::from_env`].
    pub fn load_or_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!("{} not found, reading configuration from environment", path.display());
            Self::from_env()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Apply `DB1_*` / `DB2_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.database1.apply_overrides("DB1", &lookup)?;
        self.database2.apply_overrides("DB2", &lookup)?;
        Ok(())
    }
}

impl DatabaseConfig {
    fn apply_overrides<F>(&mut self, prefix: &str, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}_{}", prefix, name)).filter(|v| !v.is_empty());

        if let Some(host) = get("HOST") {
            self.host = host;
        }
        if let Some(port) = get("PORT") {
            self.port = port.parse().map_err(|e| {
                CompareError::Config(format!("invalid {}_PORT '{}': {}", prefix, port, e))
            })?;
        }
        if let Some(database) = get("DATABASE") {
            self.database = database;
        }
        if let Some(user) = get("USERNAME") {
            self.user = user;
        }
        if let Some(password) = get("PASSWORD") {
            self.password = password;
        }
        if let Some(ssl_mode) = get("SSL_MODE") {
            self.ssl_mode = ssl_mode;
        }
        Ok(())
    }

    /// Short `host:port/database` label for logs.
    pub fn label(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}
