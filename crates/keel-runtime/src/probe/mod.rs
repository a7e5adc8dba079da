//! Schema prober.
//!
//! Checks whether any configured marker table exists. Probing is diagnostic
//! only: it never fails and never blocks migration.

mod catalog;

pub use catalog::marker_query;

use serde::Serialize;
use tracing::{debug, info};

use keel_core::{ConnectionHandle, MarkerSet};

/// Outcome of a schema probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SchemaProbe {
    /// No markers configured; no query was issued.
    Skipped,
    /// The database did not accept connections.
    Unreachable,
    /// None of the markers exist, or the catalog query failed.
    NotDetected,
    /// These marker tables exist.
    Detected { tables: Vec<String> },
}

impl SchemaProbe {
    pub fn is_detected(&self) -> bool {
        matches!(self, SchemaProbe::Detected { .. })
    }
}

/// Probe the catalog for `markers`.
pub async fn probe_schema(conn: &dyn ConnectionHandle, markers: &MarkerSet) -> SchemaProbe {
    if markers.is_empty() {
        debug!("No marker tables configured, skipping schema probe");
        return SchemaProbe::Skipped;
    }

    if !conn.can_connect().await {
        debug!("Database unreachable, skipping schema probe");
        return SchemaProbe::Unreachable;
    }

    let engine = conn.engine();
    let sql = marker_query(engine, markers);
    match conn.query_column(&sql).await {
        Ok(found) => {
            let tables: Vec<String> = found
                .into_iter()
                .filter(|t| markers.matches(t, engine.folds_identifier_case()))
                .collect();
            if tables.is_empty() {
                info!("No marker tables found, schema not present");
                SchemaProbe::NotDetected
            } else {
                info!(tables = ?tables, "Existing schema detected");
                SchemaProbe::Detected { tables }
            }
        }
        Err(e) => {
            debug!(engine = %engine, "Schema probe failed, treating as not detected: {}", e);
            SchemaProbe::NotDetected
        }
    }
}

/// Whether at least one marker table exists. Never fails.
pub async fn detect_schema(conn: &dyn ConnectionHandle, markers: &MarkerSet) -> bool {
    probe_schema(conn, markers).await.is_detected()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::testing::MockConnection;
    use keel_core::EngineKind;

    const ENGINES: [EngineKind; 5] = [
        EngineKind::Postgres,
        EngineKind::MySql,
        EngineKind::SqlServer,
        EngineKind::Sqlite,
        EngineKind::Other,
    ];

    #[tokio::test]
    async fn test_empty_markers_issue_no_query() {
        for engine in ENGINES {
            let conn = MockConnection::new(engine).with_table("user");
            assert_eq!(
                probe_schema(&conn, &MarkerSet::default()).await,
                SchemaProbe::Skipped
            );
            assert!(!detect_schema(&conn, &MarkerSet::default()).await);
            assert!(conn.journal().is_empty());
        }
    }

    #[tokio::test]
    async fn test_detects_existing_marker_on_every_engine() {
        for engine in ENGINES {
            let conn = MockConnection::new(engine).with_table("user");
            let probe = probe_schema(&conn, &MarkerSet::new(["user", "role"])).await;
            assert_eq!(
                probe,
                SchemaProbe::Detected {
                    tables: vec!["user".to_string()]
                },
                "engine {}",
                engine
            );
        }
    }

    #[tokio::test]
    async fn test_missing_markers_not_detected_on_every_engine() {
        for engine in ENGINES {
            let conn = MockConnection::new(engine).with_table("posts");
            assert!(!detect_schema(&conn, &MarkerSet::new(["user"])).await);
            assert_eq!(conn.journal().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_catalog_failure_degrades_to_not_detected() {
        for engine in ENGINES {
            let conn = MockConnection::new(engine)
                .with_table("user")
                .fail_catalog_queries();
            assert_eq!(
                probe_schema(&conn, &MarkerSet::new(["user"])).await,
                SchemaProbe::NotDetected
            );
        }
    }

    #[tokio::test]
    async fn test_unreachable_database_is_not_probed() {
        let conn = MockConnection::missing(EngineKind::Postgres);
        assert_eq!(
            probe_schema(&conn, &MarkerSet::new(["user"])).await,
            SchemaProbe::Unreachable
        );
        assert!(conn.journal().is_empty());
    }

    #[tokio::test]
    async fn test_marker_case_ignored_where_engine_folds_case() {
        for engine in [EngineKind::MySql, EngineKind::SqlServer, EngineKind::Sqlite] {
            let conn = MockConnection::new(engine).with_table("Users");
            assert_eq!(
                probe_schema(&conn, &MarkerSet::new(["users"])).await,
                SchemaProbe::Detected {
                    tables: vec!["Users".to_string()]
                },
                "engine {}",
                engine
            );
        }
    }

    #[tokio::test]
    async fn test_postgres_marker_case_is_exact() {
        let conn = MockConnection::new(EngineKind::Postgres).with_table("Users");
        assert!(!detect_schema(&conn, &MarkerSet::new(["users"])).await);
        assert!(detect_schema(&conn, &MarkerSet::new(["Users"])).await);
    }

    #[tokio::test]
    async fn test_sqlite_file_marker_differs_in_case() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = keel_core::config::DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("app.db").display()),
            ..Default::default()
        };
        let conn = crate::SqlxConnection::from_config(&config).unwrap();
        conn.execute_raw("CREATE TABLE Users (id INTEGER)").await.unwrap();

        assert!(detect_schema(&conn, &MarkerSet::new(["users"])).await);
        assert!(detect_schema(&conn, &MarkerSet::new(["USERS", "roles"])).await);
        assert!(!detect_schema(&conn, &MarkerSet::new(["roles"])).await);
        conn.close().await;
    }

    #[tokio::test]
    async fn test_postgres_scenario_detects_user_table() {
        let conn = MockConnection::new(EngineKind::Postgres).with_table("user");
        assert!(detect_schema(&conn, &MarkerSet::new(["user"])).await);
        keel_core::assert_sql_executed!(conn, "pg_tables");
    }
}
