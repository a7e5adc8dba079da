mod bootstrap;
mod database;
mod logging;

pub use bootstrap::{BootstrapConfig, DEFAULT_LEDGER_TABLE};
pub use database::DatabaseConfig;
pub use logging::LoggingConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{KeelError, Result};

/// Root configuration, usually read from `keel.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeelConfig {
    /// Target database.
    pub database: DatabaseConfig,

    /// Bootstrap behaviour.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KeelConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| KeelError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        let config: Self = toml::from_str(&content)
            .map_err(|e| KeelError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with defaults for everything but the database URL.
    pub fn default_with_database_url(url: &str) -> Self {
        Self {
            database: DatabaseConfig {
                url: url.to_string(),
                ..Default::default()
            },
            bootstrap: BootstrapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Reject configurations that would produce unsafe or meaningless SQL.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(KeelError::Config("database.url is empty".into()));
        }
        if !is_valid_identifier(&self.bootstrap.ledger_table) {
            return Err(KeelError::Config(format!(
                "bootstrap.ledger_table '{}' is not a plain identifier",
                self.bootstrap.ledger_table
            )));
        }
        if let Some(marker) = self
            .bootstrap
            .markers
            .iter()
            .find(|m| m.contains(['\'', '"', ';']))
        {
            return Err(KeelError::Config(format!(
                "marker table '{}' contains a quote or semicolon",
                marker
            )));
        }
        if self.bootstrap.lock_stale_secs == 0 {
            return Err(KeelError::Config(
                "bootstrap.lock_stale_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Whether `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let Ok(re) = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") else {
        return result;
    };

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
