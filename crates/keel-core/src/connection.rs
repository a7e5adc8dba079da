//! The database capability the bootstrap stages consume.

use futures::future::BoxFuture;

use crate::engine::EngineKind;
use crate::error::Result;

/// Opaque handle to one target database.
///
/// Implementations are supplied by the driver layer. The bootstrap stages only
/// ever talk to the database through this trait, which keeps every stage
/// testable against [`MockConnection`](crate::testing::MockConnection).
pub trait ConnectionHandle: Send + Sync {
    /// Engine behind this handle.
    fn engine(&self) -> EngineKind;

    /// Whether the target database currently accepts connections.
    fn can_connect(&self) -> BoxFuture<'_, bool>;

    /// Execute a single statement, returning the number of rows affected.
    fn execute_raw<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64>>;

    /// Execute statements in order inside one transaction.
    ///
    /// Either every statement commits or none does (subject to the engine's
    /// own DDL semantics). Returns the total rows affected.
    fn execute_atomic<'a>(&'a self, statements: &'a [String]) -> BoxFuture<'a, Result<u64>>;

    /// Run a query and return the first column of every row as text.
    fn query_column<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

    /// Engine-native "create database" for the database this handle targets.
    fn create_database(&self) -> BoxFuture<'_, Result<()>>;
}
