use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::any::{Any, AnyPoolOptions};
use sqlx::migrate::MigrateDatabase;
use sqlx::{AnyConnection, AnyPool, Row};

use keel_core::config::DatabaseConfig;
use keel_core::error::{KeelError, Result};
use keel_core::{ConnectionHandle, EngineKind};

/// Connection handle backed by an sqlx `AnyPool`.
///
/// The pool is created lazily so that a database which does not exist yet
/// can still be handed to the provisioner. Postgres, MySQL/MariaDB and SQLite
/// are supported.
#[derive(Clone)]
pub struct SqlxConnection {
    pool: AnyPool,
    url: String,
    engine: EngineKind,
    sqlite_file: Option<PathBuf>,
}

impl SqlxConnection {
    /// Create a handle from configuration. Does not open a connection.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let engine = config.engine();
        if matches!(engine, EngineKind::SqlServer | EngineKind::Other) {
            return Err(KeelError::Config(format!(
                "No sqlx driver for the {} engine; supply a custom ConnectionHandle",
                engine
            )));
        }

        sqlx::any::install_default_drivers();

        let url = normalize_url(engine, &config.url);
        let pool = AnyPoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_lazy(&url)
            .map_err(|e| KeelError::Config(format!("Invalid database URL: {}", e)))?;

        let sqlite_file = match engine {
            EngineKind::Sqlite => sqlite_file_path(&config.url),
            _ => None,
        };

        Ok(Self {
            pool,
            url,
            engine,
            sqlite_file,
        })
    }

    /// Underlying pool, for callers that want to keep using it after bootstrap.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl ConnectionHandle for SqlxConnection {
    fn engine(&self) -> EngineKind {
        self.engine
    }

    fn can_connect(&self) -> BoxFuture<'_, bool> {
        async move {
            // Opening a missing SQLite file would create it; report it as absent instead.
            if let Some(path) = &self.sqlite_file {
                if !path.exists() {
                    return false;
                }
            }
            match self.pool.acquire().await {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!(engine = %self.engine, "Connection attempt failed: {}", e);
                    false
                }
            }
        }
        .boxed()
    }

    fn execute_raw<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64>> {
        async move {
            let result = sqlx::raw_sql(sql).execute(&self.pool).await?;
            Ok(result.rows_affected())
        }
        .boxed()
    }

    fn execute_atomic<'a>(&'a self, statements: &'a [String]) -> BoxFuture<'a, Result<u64>> {
        async move {
            let mut tx = self.pool.begin().await?;
            let mut affected = 0;
            for statement in statements {
                let conn: &mut AnyConnection = &mut tx;
                affected += sqlx::Executor::execute(conn, sqlx::raw_sql(statement))
                    .await?
                    .rows_affected();
            }
            tx.commit().await?;
            Ok(affected)
        }
        .boxed()
    }

    fn query_column<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        async move {
            let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
            let values = rows
                .iter()
                .map(|row| row.try_get::<String, _>(0))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(values)
        }
        .boxed()
    }

    fn create_database(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            Any::create_database(&self.url).await?;
            Ok(())
        }
        .boxed()
    }
}

/// SQLite only creates a missing file when asked to, so request it.
fn normalize_url(engine: EngineKind, url: &str) -> String {
    if engine != EngineKind::Sqlite || url.contains(":memory:") || url.contains("mode=") {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}mode=rwc", url, separator)
}

/// Filesystem path of a SQLite URL, or `None` for in-memory databases.
fn sqlite_file_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    Some(PathBuf::from(path))
}
