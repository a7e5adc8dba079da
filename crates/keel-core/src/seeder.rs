use futures::future::BoxFuture;

use crate::connection::ConnectionHandle;
use crate::error::Result;

/// A named routine that populates data after migrations have run.
///
/// Seeders run on every bootstrap. An implementation must detect data it
/// has already written and do nothing in that case (check before insert).
pub trait Seeder: Send + Sync {
    /// Name used in logs and in the bootstrap report.
    fn name(&self) -> &str;

    /// Populate the database.
    fn seed<'a>(&'a self, conn: &'a dyn ConnectionHandle) -> BoxFuture<'a, Result<()>>;
}
