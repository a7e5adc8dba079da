use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::marker::MarkerSet;

/// Default ledger table recording applied migrations.
pub const DEFAULT_LEDGER_TABLE: &str = "keel_migrations";

/// Bootstrap behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Tables whose presence means the schema already exists.
    #[serde(default)]
    pub markers: MarkerSet,

    /// Directory holding `<version>_<name>.sql` migration files.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,

    /// Directory holding `*.sql` seed files.
    #[serde(default = "default_seeds_dir")]
    pub seeds_dir: PathBuf,

    /// Whether a missing database may be created.
    #[serde(default = "default_true")]
    pub create_database: bool,

    /// Whether the seeder stage runs.
    #[serde(default = "default_true")]
    pub seed: bool,

    /// Ledger table name.
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,

    /// How long to wait for another process's migration lock, in seconds.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Delay between lock attempts, in milliseconds.
    #[serde(default = "default_lock_poll_interval")]
    pub lock_poll_interval_ms: u64,

    /// Age in seconds after which a held lock is treated as abandoned by a
    /// crashed process and may be taken over.
    #[serde(default = "default_lock_stale")]
    pub lock_stale_secs: u64,
}

impl BootstrapConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs)
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            markers: MarkerSet::default(),
            migrations_dir: default_migrations_dir(),
            seeds_dir: default_seeds_dir(),
            create_database: true,
            seed: true,
            ledger_table: default_ledger_table(),
            lock_timeout_secs: default_lock_timeout(),
            lock_poll_interval_ms: default_lock_poll_interval(),
            lock_stale_secs: default_lock_stale(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_seeds_dir() -> PathBuf {
    PathBuf::from("seeds")
}

fn default_ledger_table() -> String {
    DEFAULT_LEDGER_TABLE.to_string()
}

fn default_lock_timeout() -> u64 {
    60
}

fn default_lock_poll_interval() -> u64 {
    250
}

fn default_lock_stale() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bootstrap_config() {
        let config = BootstrapConfig::default();
        assert!(config.markers.is_empty());
        assert!(config.create_database);
        assert!(config.seed);
        assert_eq!(config.ledger_table, "keel_migrations");
        assert_eq!(config.lock_timeout(), Duration::from_secs(60));
        assert_eq!(config.lock_poll_interval(), Duration::from_millis(250));
        assert_eq!(config.lock_stale_after(), Duration::from_secs(600));
    }

    #[test]
    fn test_parse_bootstrap_config() {
        let toml = r#"
            markers = ["user", "role"]
            migrations_dir = "db/migrations"
            create_database = false
            lock_timeout_secs = 5
            lock_stale_secs = 120
        "#;

        let config: BootstrapConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.markers.len(), 2);
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
        assert_eq!(config.seeds_dir, PathBuf::from("seeds"));
        assert!(!config.create_database);
        assert_eq!(config.lock_timeout_secs, 5);
        assert_eq!(config.lock_stale_secs, 120);
    }
}
