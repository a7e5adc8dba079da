//! Migration ledger, locking and application.

mod applier;
mod ledger;
mod loader;
mod lock;

pub use applier::{MigrationApplier, MigrationStatus};
pub use ledger::MigrationLedger;
pub use loader::load_migrations_from_dir;
pub use lock::{
    MigrationLock, DEFAULT_LOCK_POLL_INTERVAL, DEFAULT_LOCK_STALE_AFTER, DEFAULT_LOCK_TIMEOUT,
};
