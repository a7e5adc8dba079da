use thiserror::Error;

use crate::engine::EngineKind;

/// Core error type for keel operations.
#[derive(Error, Debug)]
pub enum KeelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The target database could not be reached or created, and the failure
    /// was not explained by a concurrent creator.
    #[error("Provisioning failed on {engine} during {operation}: {message}")]
    Provision {
        engine: EngineKind,
        operation: &'static str,
        message: String,
    },

    /// A migration failed to apply or revert. The remaining sequence was not run.
    #[error("Migration '{name}' failed: {message}")]
    Migration { name: String, message: String },

    /// A single seeder failed. Never aborts a bootstrap.
    #[error("Seeder '{name}' failed: {message}")]
    Seeder { name: String, message: String },

    #[error("Migration lock error: {0}")]
    Lock(String),
}

impl KeelError {
    /// Whether this error must prevent the host from becoming ready.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, KeelError::Seeder { .. })
    }

    /// Build a [`KeelError::Migration`] for the named migration.
    pub fn migration(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        KeelError::Migration {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias using KeelError.
pub type Result<T> = std::result::Result<T, KeelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeder_errors_are_not_fatal() {
        let err = KeelError::Seeder {
            name: "users".into(),
            message: "boom".into(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_provision_error_carries_context() {
        let err = KeelError::Provision {
            engine: EngineKind::Postgres,
            operation: "create database",
            message: "permission denied".into(),
        };
        assert!(err.is_fatal());
        let text = err.to_string();
        assert!(text.contains("postgres"));
        assert!(text.contains("create database"));
        assert!(text.contains("permission denied"));
    }

    #[test]
    fn test_migration_error_names_migration() {
        let err = KeelError::migration("0002_add_posts", "syntax error");
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Migration '0002_add_posts' failed: syntax error");
    }
}
