//! Cross-process migration lock.
//!
//! The lock is a single row (`id = 1`) in the ledger's companion lock table.
//! Inserting the row acquires it; the primary key makes a second insert fail
//! while another process holds it. Works the same on every engine, and
//! across the separate pooled connections a bootstrap may use.
//!
//! A row older than the stale lease was left by a process that died while
//! holding it. Waiters delete such a row with a conditional `DELETE` and race
//! on the insert again; the database clock decides age, so host clock skew
//! does not matter.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use keel_core::error::{KeelError, Result};
use keel_core::{ConnectionHandle, EngineKind};

use super::ledger::{escape, MigrationLedger};

/// Default time to wait for another process to finish migrating.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between acquisition attempts.
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default age after which a held lock counts as abandoned.
pub const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(600);

/// A lock owned by this process.
#[derive(Debug, Clone)]
pub struct MigrationLock {
    table: String,
    owner: String,
    timeout: Duration,
    poll_interval: Duration,
    stale_after: Duration,
}

impl MigrationLock {
    pub fn new(ledger: &MigrationLedger) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            table: ledger.lock_table(),
            owner: format!("{}:{}:{}", host, std::process::id(), Uuid::new_v4()),
            timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
            stale_after: DEFAULT_LOCK_STALE_AFTER,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Lease after which another process's lock may be taken over. Must
    /// exceed the longest migration run.
    pub fn stale_after(mut self, lease: Duration) -> Self {
        self.stale_after = lease;
        self
    }

    /// Identifies this process in the lock table.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Wait until the lock row can be inserted, or the timeout elapses.
    pub async fn acquire(&self, conn: &dyn ConnectionHandle) -> Result<()> {
        debug!("Acquiring migration lock...");
        let insert = format!(
            "INSERT INTO {} (id, owner) VALUES (1, '{}')",
            self.table,
            escape(&self.owner)
        );
        let deadline = Instant::now() + self.timeout;

        loop {
            match conn.execute_raw(&insert).await {
                Ok(_) => {
                    debug!(owner = %self.owner, "Migration lock acquired");
                    return Ok(());
                }
                Err(e) => {
                    if self.expire_stale(conn).await {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(KeelError::Lock(format!(
                            "gave up after {:?} waiting for {}; it is held by a live process \
                             or will be taken over once older than {:?} (last error: {})",
                            self.timeout, self.table, self.stale_after, e
                        )));
                    }
                    debug!("Migration lock busy, retrying: {}", e);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Statement deleting the lock row if it is older than the lease.
    pub fn expire_sql(&self, engine: EngineKind) -> String {
        format!(
            "DELETE FROM {} WHERE id = 1 AND acquired_at < {}",
            self.table,
            stale_cutoff(engine, self.stale_after.as_secs())
        )
    }

    /// Remove an abandoned lock row. True when one was removed.
    async fn expire_stale(&self, conn: &dyn ConnectionHandle) -> bool {
        match conn.execute_raw(&self.expire_sql(conn.engine())).await {
            Ok(0) => false,
            Ok(_) => {
                warn!(
                    lease = ?self.stale_after,
                    "Removed stale migration lock left by a dead process"
                );
                true
            }
            Err(e) => {
                debug!("Stale lock check failed: {}", e);
                false
            }
        }
    }

    /// Delete the lock row, only if this process owns it.
    pub async fn release(&self, conn: &dyn ConnectionHandle) -> Result<()> {
        let delete = format!(
            "DELETE FROM {} WHERE id = 1 AND owner = '{}'",
            self.table,
            escape(&self.owner)
        );
        conn.execute_raw(&delete)
            .await
            .map_err(|e| KeelError::Lock(format!("Failed to release migration lock: {}", e)))?;
        debug!("Migration lock released");
        Ok(())
    }
}

/// Database-side timestamp `secs` seconds in the past, comparable with the
/// `acquired_at` column each engine's DDL declares.
fn stale_cutoff(engine: EngineKind, secs: u64) -> String {
    match engine {
        EngineKind::Postgres => format!("NOW() - INTERVAL '{} seconds'", secs),
        EngineKind::MySql => format!("CURRENT_TIMESTAMP - INTERVAL {} SECOND", secs),
        EngineKind::SqlServer => format!("DATEADD(SECOND, -{}, SYSUTCDATETIME())", secs),
        EngineKind::Sqlite => format!("datetime('now', '-{} seconds')", secs),
        EngineKind::Other => format!("CURRENT_TIMESTAMP - INTERVAL '{}' SECOND", secs),
    }
}
