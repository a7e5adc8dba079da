//! Database provisioner.
//!
//! Makes sure the target database exists, tolerating a concurrent process
//! that creates it at the same time.

use serde::Serialize;
use tracing::{info, warn};

use keel_core::error::{KeelError, Result};
use keel_core::ConnectionHandle;

/// What the provisioner found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// The database already accepted connections.
    AlreadyExists,
    /// File-backed engine; the database appears on first write.
    SelfCreating,
    /// This process created the database.
    Created,
    /// Creation failed but the database exists now: another process won the race.
    CreatedConcurrently,
}

/// Ensures the target database exists.
#[derive(Debug, Clone)]
pub struct Provisioner {
    allow_create: bool,
}

impl Provisioner {
    pub fn new() -> Self {
        Self { allow_create: true }
    }

    /// Whether a missing database may be created. When disabled, an
    /// unreachable database is a provisioning error.
    pub fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = allow;
        self
    }

    /// Make sure the database behind `conn` exists.
    pub async fn ensure_database(&self, conn: &dyn ConnectionHandle) -> Result<ProvisionOutcome> {
        let engine = conn.engine();

        if conn.can_connect().await {
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        if engine.is_file_backed() {
            info!(%engine, "Database file will be created on first write");
            return Ok(ProvisionOutcome::SelfCreating);
        }

        if !self.allow_create {
            return Err(KeelError::Provision {
                engine,
                operation: "connect",
                message: "database is unreachable and creation is disabled".into(),
            });
        }

        info!(%engine, "Database unreachable, creating it");
        let create_error = match conn.create_database().await {
            Ok(()) => {
                info!(%engine, "Database created");
                return Ok(ProvisionOutcome::Created);
            }
            Err(e) => e,
        };

        // A racing process may have created it between our check and our create.
        if conn.can_connect().await {
            warn!(
                %engine,
                "Database creation failed but the database now exists, assuming a concurrent creator: {}",
                create_error
            );
            Ok(ProvisionOutcome::CreatedConcurrently)
        } else {
            Err(KeelError::Provision {
                engine,
                operation: "create database",
                message: create_error.to_string(),
            })
        }
    }
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::new()
    }
}

/// Ensure the database exists using the default provisioner.
pub async fn ensure_database(conn: &dyn ConnectionHandle) -> Result<ProvisionOutcome> {
    Provisioner::new().ensure_database(conn).await
}
