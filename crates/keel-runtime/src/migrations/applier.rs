//! Migration applier with cross-process locking.
//!
//! Pending migrations are applied in name order. Each migration's statements
//! and its ledger record commit in one transaction, so a failed migration
//! leaves neither partial schema nor a ledger entry behind, and the
//! remaining sequence is not attempted.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use keel_core::config::BootstrapConfig;
use keel_core::error::{KeelError, Result};
use keel_core::migration::order_migrations;
use keel_core::{ConnectionHandle, Migration};

use super::ledger::MigrationLedger;
use super::lock::{
    MigrationLock, DEFAULT_LOCK_POLL_INTERVAL, DEFAULT_LOCK_STALE_AFTER, DEFAULT_LOCK_TIMEOUT,
};

/// Where each known migration stands against the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Applied and present in the migration set.
    pub applied: Vec<String>,
    /// Present in the migration set but not applied.
    pub pending: Vec<String>,
    /// Recorded in the ledger but absent from the migration set.
    pub unknown: Vec<String>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Applies and reverts migrations against a ledger.
#[derive(Debug, Clone)]
pub struct MigrationApplier {
    ledger: MigrationLedger,
    lock_timeout: Duration,
    lock_poll_interval: Duration,
    lock_stale_after: Duration,
}

impl MigrationApplier {
    pub fn new() -> Self {
        Self {
            ledger: MigrationLedger::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
            lock_stale_after: DEFAULT_LOCK_STALE_AFTER,
        }
    }

    pub fn from_config(config: &BootstrapConfig) -> Result<Self> {
        Ok(Self {
            ledger: MigrationLedger::new(&config.ledger_table)?,
            lock_timeout: config.lock_timeout(),
            lock_poll_interval: config.lock_poll_interval(),
            lock_stale_after: config.lock_stale_after(),
        })
    }

    pub fn ledger_table(mut self, table: impl Into<String>) -> Result<Self> {
        self.ledger = MigrationLedger::new(table)?;
        Ok(self)
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }

    pub fn lock_stale_after(mut self, lease: Duration) -> Self {
        self.lock_stale_after = lease;
        self
    }

    pub fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    fn lock(&self) -> MigrationLock {
        MigrationLock::new(&self.ledger)
            .timeout(self.lock_timeout)
            .poll_interval(self.lock_poll_interval)
            .stale_after(self.lock_stale_after)
    }

    /// Apply every migration not yet recorded in the ledger.
    ///
    /// Returns the names applied by this call, in order. An empty set is a
    /// no-op that touches nothing.
    pub async fn apply_pending(
        &self,
        conn: &dyn ConnectionHandle,
        migrations: &[Migration],
    ) -> Result<Vec<String>> {
        let ordered = order_migrations(migrations)?;
        if ordered.is_empty() {
            debug!("No migrations to apply");
            return Ok(Vec::new());
        }

        self.ledger.ensure(conn).await?;

        let lock = self.lock();
        lock.acquire(conn).await?;

        let result = self.apply_locked(conn, &ordered).await;

        // Always release lock, even on error
        if let Err(e) = lock.release(conn).await {
            warn!("Failed to release migration lock: {}", e);
        }

        result
    }

    async fn apply_locked(
        &self,
        conn: &dyn ConnectionHandle,
        ordered: &[&Migration],
    ) -> Result<Vec<String>> {
        // Read under the lock: a peer may have finished while we waited.
        let applied: HashSet<String> = self.ledger.applied(conn).await?.into_iter().collect();
        debug!("Already applied migrations: {:?}", applied);

        let mut newly_applied = Vec::new();
        for migration in ordered {
            if applied.contains(&migration.name) {
                continue;
            }
            self.apply_one(conn, migration).await?;
            newly_applied.push(migration.name.clone());
        }

        if newly_applied.is_empty() {
            info!("Schema is up to date");
        } else {
            info!(count = newly_applied.len(), "Migrations applied");
        }
        Ok(newly_applied)
    }

    async fn apply_one(&self, conn: &dyn ConnectionHandle, migration: &Migration) -> Result<()> {
        info!("Applying migration: {}", migration.name);

        let mut statements = migration.up_statements();
        statements.push(self.ledger.record_sql(&migration.name));

        conn.execute_atomic(&statements)
            .await
            .map_err(|e| KeelError::migration(&migration.name, e))?;

        info!("Migration applied: {}", migration.name);
        Ok(())
    }

    /// Compare the migration set with the ledger. Creates the ledger if absent.
    pub async fn status(
        &self,
        conn: &dyn ConnectionHandle,
        migrations: &[Migration],
    ) -> Result<MigrationStatus> {
        let ordered = order_migrations(migrations)?;
        self.ledger.ensure(conn).await?;
        let recorded = self.ledger.applied(conn).await?;
        let recorded_set: HashSet<&str> = recorded.iter().map(String::as_str).collect();
        let known: HashSet<&str> = ordered.iter().map(|m| m.name.as_str()).collect();

        let mut status = MigrationStatus::default();
        for migration in &ordered {
            if recorded_set.contains(migration.name.as_str()) {
                status.applied.push(migration.name.clone());
            } else {
                status.pending.push(migration.name.clone());
            }
        }
        status.unknown = recorded
            .iter()
            .filter(|name| !known.contains(name.as_str()))
            .cloned()
            .collect();
        Ok(status)
    }

    /// Revert the `count` most recently applied migrations, newest first.
    ///
    /// Recency is ledger application order, so a migration merged late and
    /// applied after a higher-numbered one is reverted before it.
    ///
    /// Stops at the first migration that cannot be reverted: one without a
    /// down section, or one missing from `migrations`.
    pub async fn rollback(
        &self,
        conn: &dyn ConnectionHandle,
        migrations: &[Migration],
        count: usize,
    ) -> Result<Vec<String>> {
        let ordered = order_migrations(migrations)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        self.ledger.ensure(conn).await?;

        let lock = self.lock();
        lock.acquire(conn).await?;

        let result = self.rollback_locked(conn, &ordered, count).await;

        if let Err(e) = lock.release(conn).await {
            warn!("Failed to release migration lock: {}", e);
        }

        result
    }

    async fn rollback_locked(
        &self,
        conn: &dyn ConnectionHandle,
        ordered: &[&Migration],
        count: usize,
    ) -> Result<Vec<String>> {
        // Oldest first, by applied_at.
        let applied = self.ledger.applied(conn).await?;
        let mut reverted = Vec::new();

        for name in applied.iter().rev().take(count) {
            let migration = ordered
                .iter()
                .find(|m| &m.name == name)
                .ok_or_else(|| KeelError::migration(name, "applied but not in the migration set"))?;
            let mut statements = migration
                .down_statements()
                .ok_or_else(|| KeelError::migration(name, "has no down section"))?;
            statements.push(self.ledger.remove_sql(name));

            info!("Reverting migration: {}", name);
            conn.execute_atomic(&statements)
                .await
                .map_err(|e| KeelError::migration(name, e))?;
            reverted.push(name.clone());
        }

        if reverted.is_empty() {
            info!("Nothing to revert");
        }
        Ok(reverted)
    }
}

impl Default for MigrationApplier {
    fn default() -> Self {
        Self::new()
    }
}
