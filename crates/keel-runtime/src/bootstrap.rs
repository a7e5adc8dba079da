//! Bootstrap orchestrator.
//!
//! Runs provision → probe → apply → seed, each stage awaited to completion
//! before the next. Provisioning and migration failures abort the run;
//! seeder failures are recorded in the result.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use keel_core::config::BootstrapConfig;
use keel_core::error::Result;
use keel_core::{ConnectionHandle, MarkerSet, Migration, Seeder};

use crate::migrations::MigrationApplier;
use crate::probe::{probe_schema, SchemaProbe};
use crate::provision::{ProvisionOutcome, Provisioner};
use crate::seeding::{SeederReport, SeederRunner};

/// Outcome of one bootstrap run.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapResult {
    /// This run created the database.
    pub provisioned: bool,
    /// A marker table existed before migrations ran.
    pub schema_detected: bool,
    /// The apply stage completed, whether or not anything was pending.
    pub migrations_applied: bool,
    /// Per-seeder outcomes in registration order.
    pub seeder_outcomes: Vec<SeederReport>,

    pub provision: ProvisionOutcome,
    pub schema: SchemaProbe,
    /// Migrations applied by this run.
    pub applied_migrations: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl BootstrapResult {
    pub fn failed_seeders(&self) -> impl Iterator<Item = &SeederReport> {
        self.seeder_outcomes
            .iter()
            .filter(|r| !r.outcome.is_success())
    }

    pub fn all_seeders_succeeded(&self) -> bool {
        self.failed_seeders().next().is_none()
    }
}

/// Configured bootstrap, reusable across runs.
#[derive(Clone, Default)]
pub struct Bootstrapper {
    markers: MarkerSet,
    migrations: Vec<Migration>,
    seeders: SeederRunner,
    provisioner: Provisioner,
    applier: MigrationApplier,
    skip_seeding: bool,
}

impl Bootstrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Markers, database creation, ledger and lock settings from configuration.
    /// Migrations and seeders are added separately.
    pub fn from_config(config: &BootstrapConfig) -> Result<Self> {
        Ok(Self {
            markers: config.markers.clone(),
            provisioner: Provisioner::new().allow_create(config.create_database),
            applier: MigrationApplier::from_config(config)?,
            skip_seeding: !config.seed,
            ..Self::default()
        })
    }

    pub fn markers(mut self, markers: impl Into<MarkerSet>) -> Self {
        self.markers = markers.into();
        self
    }

    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.push(migration);
        self
    }

    pub fn migrations(mut self, migrations: impl IntoIterator<Item = Migration>) -> Self {
        self.migrations.extend(migrations);
        self
    }

    pub fn seeder(mut self, seeder: impl Seeder + 'static) -> Self {
        self.seeders.register(Arc::new(seeder));
        self
    }

    pub fn seeders(mut self, seeders: impl IntoIterator<Item = Arc<dyn Seeder>>) -> Self {
        for seeder in seeders {
            self.seeders.register(seeder);
        }
        self
    }

    pub fn provisioner(mut self, provisioner: Provisioner) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn applier(mut self, applier: MigrationApplier) -> Self {
        self.applier = applier;
        self
    }

    /// Whether the seeder stage runs. On by default.
    pub fn seed(mut self, enabled: bool) -> Self {
        self.skip_seeding = !enabled;
        self
    }

    pub fn migration_set(&self) -> &[Migration] {
        &self.migrations
    }

    /// Bring the database behind `conn` to the migrated, seeded state.
    pub async fn run(&self, conn: &dyn ConnectionHandle) -> Result<BootstrapResult> {
        let span = info_span!("bootstrap", engine = %conn.engine());
        self.run_stages(conn).instrument(span).await
    }

    async fn run_stages(&self, conn: &dyn ConnectionHandle) -> Result<BootstrapResult> {
        let started_at = Utc::now();
        let timer = Instant::now();
        info!(
            markers = self.markers.len(),
            migrations = self.migrations.len(),
            seeders = self.seeders.len(),
            "Bootstrap started"
        );

        let provision = self
            .provisioner
            .ensure_database(conn)
            .await
            .inspect_err(|e| error!("Bootstrap aborted: {}", e))?;

        let schema = probe_schema(conn, &self.markers).await;

        let applied_migrations = self
            .applier
            .apply_pending(conn, &self.migrations)
            .await
            .inspect_err(|e| error!("Bootstrap aborted: {}", e))?;

        let seeder_outcomes = if self.skip_seeding {
            info!("Seeding disabled, skipping seeders");
            Vec::new()
        } else {
            self.seeders.run_all(conn).await
        };

        let result = BootstrapResult {
            provisioned: provision == ProvisionOutcome::Created,
            schema_detected: schema.is_detected(),
            migrations_applied: true,
            seeder_outcomes,
            provision,
            schema,
            applied_migrations,
            started_at,
            elapsed_ms: timer.elapsed().as_millis() as u64,
        };

        let failed = result.failed_seeders().count();
        if failed > 0 {
            warn!(failed, "Bootstrap completed with failed seeders");
        }
        info!(
            provisioned = result.provisioned,
            schema_detected = result.schema_detected,
            applied = result.applied_migrations.len(),
            elapsed_ms = result.elapsed_ms,
            "Bootstrap completed"
        );
        Ok(result)
    }
}

/// Run a bootstrap with default provisioning and ledger settings.
pub async fn bootstrap(
    conn: &dyn ConnectionHandle,
    markers: &MarkerSet,
    migrations: &[Migration],
    seeders: &[Arc<dyn Seeder>],
) -> Result<BootstrapResult> {
    Bootstrapper::new()
        .markers(markers.clone())
        .migrations(migrations.iter().cloned())
        .seeders(seeders.iter().cloned())
        .run(conn)
        .await
}
