use std::fmt;

use serde::{Deserialize, Serialize};

/// Relational engine behind a connection.
///
/// Catalog queries, ledger DDL and provisioning rules are chosen by matching
/// on this enum, never by inspecting a provider name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Postgres,
    /// MySQL and MariaDB.
    #[serde(alias = "mariadb")]
    MySql,
    #[serde(alias = "mssql")]
    SqlServer,
    Sqlite,
    Other,
}

impl EngineKind {
    /// Infer the engine from a connection URL scheme.
    pub fn from_url(url: &str) -> Self {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();

        match scheme.as_str() {
            "postgres" | "postgresql" => EngineKind::Postgres,
            "mysql" | "mariadb" => EngineKind::MySql,
            "mssql" | "sqlserver" => EngineKind::SqlServer,
            "sqlite" => EngineKind::Sqlite,
            _ => EngineKind::Other,
        }
    }

    /// File-backed engines create their database on first write.
    pub fn is_file_backed(&self) -> bool {
        matches!(self, EngineKind::Sqlite)
    }

    /// Whether table names compare without regard to ASCII case.
    ///
    /// SQLite always folds case; SQL Server and MySQL on their usual
    /// collations do too. Postgres keeps quoted names exact.
    pub fn folds_identifier_case(&self) -> bool {
        matches!(self, EngineKind::MySql | EngineKind::SqlServer | EngineKind::Sqlite)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Postgres => "postgres",
            EngineKind::MySql => "mysql",
            EngineKind::SqlServer => "sqlserver",
            EngineKind::Sqlite => "sqlite",
            EngineKind::Other => "other",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
