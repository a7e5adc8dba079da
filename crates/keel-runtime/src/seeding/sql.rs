use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use keel_core::error::{KeelError, Result};
use keel_core::migration::split_sql_statements;
use keel_core::{ConnectionHandle, Seeder};

/// Seeder that runs a SQL script in one transaction.
///
/// The script must be idempotent on its own, typically
/// `INSERT ... SELECT ... WHERE NOT EXISTS (...)`.
#[derive(Debug, Clone)]
pub struct SqlSeeder {
    name: String,
    statements: Vec<String>,
}

impl SqlSeeder {
    pub fn new(name: impl Into<String>, sql: &str) -> Self {
        Self {
            name: name.into(),
            statements: split_sql_statements(sql),
        }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

impl Seeder for SqlSeeder {
    fn name(&self) -> &str {
        &self.name
    }

    fn seed<'a>(&'a self, conn: &'a dyn ConnectionHandle) -> BoxFuture<'a, Result<()>> {
        async move {
            if self.statements.is_empty() {
                return Ok(());
            }
            let rows = conn.execute_atomic(&self.statements).await?;
            debug!(seeder = %self.name, rows, "Seed script executed");
            Ok(())
        }
        .boxed()
    }
}

/// Load `*.sql` seed scripts from a directory, sorted by file name.
/// A missing directory yields no seeders.
pub fn load_seeders_from_dir(dir: &Path) -> Result<Vec<Arc<dyn Seeder>>> {
    if !dir.exists() {
        debug!("Seeds directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == "sql").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();

    let mut seeders: Vec<Arc<dyn Seeder>> = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| KeelError::Config(format!("Invalid seed filename: {:?}", path)))?
            .to_string();
        let sql = std::fs::read_to_string(&path)?;
        seeders.push(Arc::new(SqlSeeder::new(name, &sql)));
    }

    debug!("Loaded {} seeders from {:?}", seeders.len(), dir);
    Ok(seeders)
}
