//! Host-facing entry point.
//!
//! A host builds a [`Keel`] from configuration at startup, awaits
//! [`Keel::bootstrap`], and only starts serving once it returns `Ok`.

use std::path::PathBuf;
use std::sync::Arc;

use keel_core::config::KeelConfig;
use keel_core::error::{KeelError, Result};
use keel_core::{ConnectionHandle, Migration, Seeder};
use keel_runtime::migrations::{load_migrations_from_dir, MigrationApplier, MigrationStatus};
use keel_runtime::probe::{probe_schema, SchemaProbe};
use keel_runtime::seeding::load_seeders_from_dir;
use keel_runtime::{BootstrapResult, Bootstrapper, SqlxConnection};

/// Prelude module for common imports.
pub mod prelude {
    pub use chrono::{DateTime, Utc};

    pub use keel_core::config::KeelConfig;
    pub use keel_core::error::{KeelError, Result};
    pub use keel_core::{ConnectionHandle, EngineKind, MarkerSet, Migration, Seeder};
    pub use keel_runtime::{
        BootstrapResult, Bootstrapper, ProvisionOutcome, SchemaProbe, SeedOutcome, SeederReport,
        SqlSeeder, SqlxConnection,
    };

    pub use crate::{Keel, KeelBuilder};
}

/// Configured bootstrap for one database.
pub struct Keel {
    config: KeelConfig,
    migrations_dir: PathBuf,
    seeds_dir: PathBuf,
    extra_migrations: Vec<Migration>,
    extra_seeders: Vec<Arc<dyn Seeder>>,
}

impl Keel {
    /// Create a new builder for configuring keel.
    pub fn builder() -> KeelBuilder {
        KeelBuilder::new()
    }

    pub fn config(&self) -> &KeelConfig {
        &self.config
    }

    /// Open a lazy connection to the configured database.
    pub fn connect(&self) -> Result<SqlxConnection> {
        SqlxConnection::from_config(&self.config.database)
    }

    /// Directory migrations followed by programmatic ones.
    pub fn migrations(&self) -> Result<Vec<Migration>> {
        let mut migrations = load_migrations_from_dir(&self.migrations_dir)?;
        migrations.extend(self.extra_migrations.iter().cloned());
        Ok(migrations)
    }

    /// Directory seeders followed by programmatic ones, in registration order.
    pub fn seeders(&self) -> Result<Vec<Arc<dyn Seeder>>> {
        let mut seeders = load_seeders_from_dir(&self.seeds_dir)?;
        seeders.extend(self.extra_seeders.iter().cloned());
        Ok(seeders)
    }

    pub fn bootstrapper(&self) -> Result<Bootstrapper> {
        let migrations = self.migrations()?;
        let seeders = self.seeders()?;
        tracing::debug!(
            migrations_dir = ?self.migrations_dir,
            seeds_dir = ?self.seeds_dir,
            migrations = migrations.len(),
            seeders = seeders.len(),
            "Loaded bootstrap inputs"
        );

        Ok(Bootstrapper::from_config(&self.config.bootstrap)?
            .migrations(migrations)
            .seeders(seeders))
    }

    /// Connect and run the full bootstrap.
    pub async fn bootstrap(&self) -> Result<BootstrapResult> {
        let conn = self.connect()?;
        let result = self.bootstrap_with(&conn).await;
        conn.close().await;
        result
    }

    /// Run the full bootstrap over a caller-supplied handle.
    pub async fn bootstrap_with(&self, conn: &dyn ConnectionHandle) -> Result<BootstrapResult> {
        self.bootstrapper()?.run(conn).await
    }

    pub async fn status(&self) -> Result<MigrationStatus> {
        let conn = self.connect()?;
        let result = self.status_with(&conn).await;
        conn.close().await;
        result
    }

    pub async fn status_with(&self, conn: &dyn ConnectionHandle) -> Result<MigrationStatus> {
        self.applier()?.status(conn, &self.migrations()?).await
    }

    /// Revert the last `count` applied migrations.
    pub async fn rollback(&self, count: usize) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let result = self.rollback_with(&conn, count).await;
        conn.close().await;
        result
    }

    pub async fn rollback_with(&self, conn: &dyn ConnectionHandle, count: usize) -> Result<Vec<String>> {
        self.applier()?
            .rollback(conn, &self.migrations()?, count)
            .await
    }

    /// Probe for the configured marker tables without changing anything.
    pub async fn probe(&self) -> Result<SchemaProbe> {
        let conn = self.connect()?;
        let probe = probe_schema(&conn, &self.config.bootstrap.markers).await;
        conn.close().await;
        Ok(probe)
    }

    fn applier(&self) -> Result<MigrationApplier> {
        MigrationApplier::from_config(&self.config.bootstrap)
    }
}

/// Builder for [`Keel`].
pub struct KeelBuilder {
    config: Option<KeelConfig>,
    migrations_dir: Option<PathBuf>,
    seeds_dir: Option<PathBuf>,
    extra_migrations: Vec<Migration>,
    extra_seeders: Vec<Arc<dyn Seeder>>,
}

impl KeelBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            migrations_dir: None,
            seeds_dir: None,
            extra_migrations: Vec::new(),
            extra_seeders: Vec::new(),
        }
    }

    pub fn config(mut self, config: KeelConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override `bootstrap.migrations_dir`.
    pub fn migrations_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.migrations_dir = Some(path.into());
        self
    }

    /// Override `bootstrap.seeds_dir`.
    pub fn seeds_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.seeds_dir = Some(path.into());
        self
    }

    /// Add a migration programmatically.
    ///
    /// Use this for migrations that need to be generated at runtime,
    /// or for testing. For most cases, use migration files instead.
    pub fn migration(mut self, migration: Migration) -> Self {
        self.extra_migrations.push(migration);
        self
    }

    /// Register a seeder. Runs after any seed files, in registration order.
    pub fn seeder(mut self, seeder: impl Seeder + 'static) -> Self {
        self.extra_seeders.push(Arc::new(seeder));
        self
    }

    pub fn build(self) -> Result<Keel> {
        let config = self
            .config
            .ok_or_else(|| KeelError::Config("Configuration is required".to_string()))?;
        config.validate()?;

        Ok(Keel {
            migrations_dir: self
                .migrations_dir
                .unwrap_or_else(|| config.bootstrap.migrations_dir.clone()),
            seeds_dir: self
                .seeds_dir
                .unwrap_or_else(|| config.bootstrap.seeds_dir.clone()),
            config,
            extra_migrations: self.extra_migrations,
            extra_seeders: self.extra_seeders,
        })
    }
}

impl Default for KeelBuilder {
    fn default() -> Self {
        Self::new()
    }
}
