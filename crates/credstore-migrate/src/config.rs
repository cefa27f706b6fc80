//! Configuration loading and validation for the migration tool.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated tool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path of the credentials document to migrate. **Required.**
    pub credentials_path: String,

    /// Directory holding the installation's key-material records.
    /// **Required.**
    pub key_store_dir: String,

    /// Tracing log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or empty.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build credstore-migrate configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise credstore-migrate configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.credentials_path, "CREDENTIALS_PATH")?;
        ensure_non_empty(&self.key_store_dir, "KEY_STORE_DIR")?;
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn validate_rejects_empty_credentials_path() {
        let cfg = Config {
            credentials_path: "".into(),
            key_store_dir: "/var/lib/credstore/secrets".into(),
            log_level: default_log_level(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_key_store_dir() {
        let cfg = Config {
            credentials_path: "/var/lib/credstore/credentials.yaml".into(),
            key_store_dir: "   ".into(),
            log_level: default_log_level(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_complete_config() {
        let cfg = Config {
            credentials_path: "/var/lib/credstore/credentials.yaml".into(),
            key_store_dir: "/var/lib/credstore/secrets".into(),
            log_level: default_log_level(),
        };
        assert!(cfg.validate().is_ok());
    }
}
