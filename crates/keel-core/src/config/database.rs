use serde::{Deserialize, Serialize};

use crate::engine::EngineKind;

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL of the target database.
    pub url: String,

    /// Engine override. Inferred from the URL scheme when absent.
    #[serde(default)]
    pub engine: Option<EngineKind>,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a connectivity check may wait, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Engine in effect: the explicit override, otherwise the URL scheme.
    pub fn engine(&self) -> EngineKind {
        self.engine
            .unwrap_or_else(|| EngineKind::from_url(&self.url))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            engine: None,
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_pool_size() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_database_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.connect_timeout_secs, 5);
        assert!(config.engine.is_none());
    }

    #[test]
    fn test_engine_inferred_from_url() {
        let config = DatabaseConfig {
            url: "mysql://root@localhost/app".into(),
            ..Default::default()
        };
        assert_eq!(config.engine(), EngineKind::MySql);
    }

    #[test]
    fn test_engine_override_wins() {
        let toml = r#"
            url = "postgres://proxy/app"
            engine = "sqlserver"
            pool_size = 2
        "#;

        let config: DatabaseConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.engine(), EngineKind::SqlServer);
        assert_eq!(config.pool_size, 2);
    }
}
