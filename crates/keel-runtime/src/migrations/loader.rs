use std::path::Path;

use tracing::debug;

use keel_core::error::{KeelError, Result};
use keel_core::migration::validate_name;
use keel_core::Migration;

/// Load migrations from a directory.
///
/// Migrations should be named like:
/// - `0001_create_users.sql`
/// - `0002_add_posts.sql`
///
/// A line reading `-- keel:down` splits a file into its up and down
/// sections. Files are returned sorted by name. A missing directory yields
/// no migrations.
pub fn load_migrations_from_dir(dir: &Path) -> Result<Vec<Migration>> {
    if !dir.exists() {
        debug!("Migrations directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_file() && path.extension().map(|e| e == "sql").unwrap_or(false) {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| KeelError::Config(format!("Invalid migration filename: {:?}", path)))?
                .to_string();
            validate_name(&name)?;

            let content = std::fs::read_to_string(&path)?;
            migrations.push(Migration::parse(name, &content));
        }
    }

    migrations.sort_by(|a, b| a.name.cmp(&b.name));

    debug!("Loaded {} migrations from {:?}", migrations.len(), dir);
    Ok(migrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_migrations_from_empty_dir() {
        let dir = TempDir::new().unwrap();
        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_migrations_from_nonexistent_dir() {
        let migrations = load_migrations_from_dir(Path::new("/nonexistent/path")).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_migrations_sorted() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("0002_second.sql"), "SELECT 2;").unwrap();
        fs::write(dir.path().join("0001_first.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("0003_third.sql"), "SELECT 3;").unwrap();

        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        let names: Vec<&str> = migrations.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["0001_first", "0002_second", "0003_third"]);
    }

    #[test]
    fn test_load_migrations_ignores_non_sql() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("0001_migration.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("readme.txt"), "Not a migration").unwrap();
        fs::write(dir.path().join("backup.sql.bak"), "Backup").unwrap();

        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].name, "0001_migration");
    }

    #[test]
    fn test_load_reads_down_section() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("0001_users.sql"),
            "CREATE TABLE users (id INT);\n-- keel:down\nDROP TABLE users;\n",
        )
        .unwrap();

        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        assert!(migrations[0].is_reversible());
        assert_eq!(
            migrations[0].down_statements().unwrap(),
            vec!["DROP TABLE users"]
        );
    }

    #[test]
    fn test_load_rejects_unsafe_names() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("0001 bad name.sql"), "SELECT 1;").unwrap();
        assert!(load_migrations_from_dir(dir.path()).is_err());
    }
}
