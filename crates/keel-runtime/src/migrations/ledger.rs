//! Applied-migrations ledger stored in the target database.

use tracing::debug;

use keel_core::config::{is_valid_identifier, DEFAULT_LEDGER_TABLE};
use keel_core::error::{KeelError, Result};
use keel_core::{ConnectionHandle, EngineKind};

/// The ledger table plus its companion lock table.
#[derive(Debug, Clone)]
pub struct MigrationLedger {
    table: String,
}

impl MigrationLedger {
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(KeelError::InvalidArgument(format!(
                "ledger table '{}' is not a plain identifier",
                table
            )));
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn lock_table(&self) -> String {
        format!("{}_lock", self.table)
    }

    /// DDL creating the ledger and lock tables if they are absent.
    pub fn create_statements(&self, engine: EngineKind) -> Vec<String> {
        let lock = self.lock_table();
        match engine {
            EngineKind::Postgres => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (name VARCHAR(255) PRIMARY KEY, applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
                    self.table
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, owner VARCHAR(255) NOT NULL, acquired_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
                    lock
                ),
            ],
            EngineKind::MySql => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (name VARCHAR(255) PRIMARY KEY, applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)",
                    self.table
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (id INT PRIMARY KEY, owner VARCHAR(255) NOT NULL, acquired_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)",
                    lock
                ),
            ],
            EngineKind::SqlServer => vec![
                format!(
                    "IF OBJECT_ID(N'{0}', N'U') IS NULL CREATE TABLE {0} (name NVARCHAR(255) NOT NULL PRIMARY KEY, applied_at DATETIME2 NOT NULL DEFAULT SYSUTCDATETIME())",
                    self.table
                ),
                format!(
                    "IF OBJECT_ID(N'{0}', N'U') IS NULL CREATE TABLE {0} (id INT NOT NULL PRIMARY KEY, owner NVARCHAR(255) NOT NULL, acquired_at DATETIME2 NOT NULL DEFAULT SYSUTCDATETIME())",
                    lock
                ),
            ],
            EngineKind::Sqlite => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY, applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)",
                    self.table
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, owner TEXT NOT NULL, acquired_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)",
                    lock
                ),
            ],
            EngineKind::Other => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (name VARCHAR(255) PRIMARY KEY, applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
                    self.table
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, owner VARCHAR(255) NOT NULL, acquired_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
                    lock
                ),
            ],
        }
    }

    /// Create the ledger and lock tables if needed.
    pub async fn ensure(&self, conn: &dyn ConnectionHandle) -> Result<()> {
        for statement in self.create_statements(conn.engine()) {
            if let Err(first) = conn.execute_raw(&statement).await {
                // Two processes racing on CREATE TABLE IF NOT EXISTS can still
                // collide in the Postgres catalog; the second attempt sees the table.
                debug!("Ledger DDL failed once, retrying: {}", first);
                conn.execute_raw(&statement)
                    .await
                    .map_err(|e| KeelError::migration(&self.table, format!("failed to create ledger: {}", e)))?;
            }
        }
        Ok(())
    }

    /// Names of applied migrations in the order they were applied.
    pub async fn applied(&self, conn: &dyn ConnectionHandle) -> Result<Vec<String>> {
        let sql = format!("SELECT name FROM {} ORDER BY applied_at, name", self.table);
        conn.query_column(&sql).await.map_err(|e| {
            KeelError::migration(&self.table, format!("failed to read applied migrations: {}", e))
        })
    }

    /// Statement that records `name` as applied.
    pub fn record_sql(&self, name: &str) -> String {
        format!("INSERT INTO {} (name) VALUES ('{}')", self.table, escape(name))
    }

    /// Statement that forgets `name`.
    pub fn remove_sql(&self, name: &str) -> String {
        format!("DELETE FROM {} WHERE name = '{}'", self.table, escape(name))
    }
}

impl Default for MigrationLedger {
    fn default() -> Self {
        Self {
            table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

pub(crate) fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::assert_sql_executed;
    use keel_core::testing::MockConnection;

    #[test]
    fn test_rejects_unsafe_table_name() {
        assert!(MigrationLedger::new("ledger; DROP TABLE user").is_err());
        assert!(MigrationLedger::new("schema_ledger").is_ok());
    }

    #[test]
    fn test_ddl_per_engine() {
        let ledger = MigrationLedger::default();
        let pg = ledger.create_statements(EngineKind::Postgres);
        assert!(pg[0].contains("TIMESTAMPTZ"));
        assert!(pg[1].contains("keel_migrations_lock"));

        let mssql = ledger.create_statements(EngineKind::SqlServer);
        assert!(mssql[0].starts_with("IF OBJECT_ID(N'keel_migrations', N'U') IS NULL"));

        let sqlite = ledger.create_statements(EngineKind::Sqlite);
        assert!(sqlite[0].contains("name TEXT PRIMARY KEY"));
    }

    #[test]
    fn test_record_and_remove_sql() {
        let ledger = MigrationLedger::default();
        assert_eq!(
            ledger.record_sql("0001_init"),
            "INSERT INTO keel_migrations (name) VALUES ('0001_init')"
        );
        assert_eq!(
            ledger.remove_sql("0001_init"),
            "DELETE FROM keel_migrations WHERE name = '0001_init'"
        );
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let conn = MockConnection::new(EngineKind::Postgres);
        let ledger = MigrationLedger::default();
        ledger.ensure(&conn).await.unwrap();
        ledger.ensure(&conn).await.unwrap();
        assert!(conn.has_table("keel_migrations"));
        assert!(conn.has_table("keel_migrations_lock"));
        assert!(ledger.applied(&conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_applied_keeps_application_order() {
        let conn = MockConnection::new(EngineKind::Sqlite);
        let ledger = MigrationLedger::default();
        ledger.ensure(&conn).await.unwrap();
        conn.execute_raw(&ledger.record_sql("0002_b")).await.unwrap();
        conn.execute_raw(&ledger.record_sql("0001_a")).await.unwrap();
        assert_eq!(ledger.applied(&conn).await.unwrap(), vec!["0002_b", "0001_a"]);
        assert_sql_executed!(conn, "ORDER BY applied_at, name");
    }
}
