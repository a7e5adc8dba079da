//! Engine-specific catalog queries for marker tables.
//!
//! Each query returns the matching table names as text in its first column.

use keel_core::{EngineKind, MarkerSet};

/// Build the catalog query that lists which `markers` exist on `engine`.
pub fn marker_query(engine: EngineKind, markers: &MarkerSet) -> String {
    let list = markers.quoted_list();
    match engine {
        EngineKind::Postgres => postgres(&list),
        EngineKind::MySql => mysql(&list),
        EngineKind::SqlServer => sqlserver(&list),
        EngineKind::Sqlite => sqlite(markers),
        EngineKind::Other => information_schema(&list),
    }
}

fn postgres(list: &str) -> String {
    format!(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = ANY (current_schemas(false)) AND tablename IN ({})",
        list
    )
}

fn mysql(list: &str) -> String {
    format!(
        "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_name IN ({})",
        list
    )
}

fn sqlserver(list: &str) -> String {
    format!(
        "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_NAME IN ({})",
        list
    )
}

// sqlite_master keeps the declared spelling while lookups ignore case.
fn sqlite(markers: &MarkerSet) -> String {
    let lowered = MarkerSet::new(markers.iter().map(str::to_ascii_lowercase));
    format!(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND lower(name) IN ({})",
        lowered.quoted_list()
    )
}

fn information_schema(list: &str) -> String {
    format!(
        "SELECT table_name FROM information_schema.tables WHERE table_name IN ({})",
        list
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> MarkerSet {
        MarkerSet::new(["user", "role"])
    }

    #[test]
    fn test_postgres_uses_pg_tables() {
        let sql = marker_query(EngineKind::Postgres, &markers());
        assert!(sql.contains("FROM pg_tables"));
        assert!(sql.ends_with("IN ('user', 'role')"));
    }

    #[test]
    fn test_mysql_scopes_to_current_database() {
        let sql = marker_query(EngineKind::MySql, &markers());
        assert!(sql.contains("information_schema.tables"));
        assert!(sql.contains("DATABASE()"));
    }

    #[test]
    fn test_sqlserver_uses_information_schema() {
        let sql = marker_query(EngineKind::SqlServer, &markers());
        assert!(sql.contains("INFORMATION_SCHEMA.TABLES"));
        assert!(sql.contains("BASE TABLE"));
    }

    #[test]
    fn test_sqlite_uses_sqlite_master() {
        let sql = marker_query(EngineKind::Sqlite, &markers());
        assert!(sql.contains("FROM sqlite_master"));
        assert!(sql.contains("type = 'table'"));
    }

    #[test]
    fn test_sqlite_compares_lowercased_names() {
        let sql = marker_query(EngineKind::Sqlite, &MarkerSet::new(["Users", "role"]));
        assert!(sql.ends_with("lower(name) IN ('users', 'role')"));
    }

    #[test]
    fn test_unknown_engine_falls_back_to_information_schema() {
        let sql = marker_query(EngineKind::Other, &markers());
        assert!(sql.starts_with("SELECT table_name FROM information_schema.tables"));
    }
}
