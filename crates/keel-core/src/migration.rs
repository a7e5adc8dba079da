//! Declarative migrations consumed by the applier.

use crate::error::{KeelError, Result};

/// Line that separates the up section from the down section of a migration file.
pub const DOWN_MARKER: &str = "-- keel:down";

/// A single migration.
///
/// Migrations are ordered by name, so names start with a sortable version
/// (e.g. `20250825074000_init_schema` or `0002_add_posts`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Unique name, also the key recorded in the ledger.
    pub name: String,
    /// SQL that applies the migration.
    pub up: String,
    /// SQL that reverts it, if the migration is reversible.
    pub down: Option<String>,
}

impl Migration {
    pub fn new(name: impl Into<String>, up: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: up.into(),
            down: None,
        }
    }

    pub fn with_down(mut self, down: impl Into<String>) -> Self {
        self.down = Some(down.into());
        self
    }

    /// Parse file content, splitting on the [`DOWN_MARKER`] line if present.
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let mut up = String::new();
        let mut down = String::new();
        let mut in_down = false;

        for line in content.lines() {
            if line.trim().eq_ignore_ascii_case(DOWN_MARKER) {
                in_down = true;
                continue;
            }
            let target = if in_down { &mut down } else { &mut up };
            target.push_str(line);
            target.push('\n');
        }

        Self {
            name: name.into(),
            up,
            down: if down.trim().is_empty() {
                None
            } else {
                Some(down)
            },
        }
    }

    /// Version prefix of the name (everything before the first `_`).
    pub fn version(&self) -> &str {
        self.name
            .split_once('_')
            .map(|(version, _)| version)
            .unwrap_or(&self.name)
    }

    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    pub fn up_statements(&self) -> Vec<String> {
        split_sql_statements(&self.up)
    }

    pub fn down_statements(&self) -> Option<Vec<String>> {
        self.down.as_deref().map(split_sql_statements)
    }
}

/// Check that a migration name is safe to embed in ledger SQL.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KeelError::migration(name, "migration name is empty"));
    }
    if name.len() > 255 {
        return Err(KeelError::migration(name, "migration name exceeds 255 characters"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(KeelError::migration(
            name,
            format!("invalid character {:?} in migration name", bad),
        ));
    }
    Ok(())
}

/// Sort migrations by name and reject invalid or duplicate names.
pub fn order_migrations(migrations: &[Migration]) -> Result<Vec<&Migration>> {
    let mut ordered: Vec<&Migration> = migrations.iter().collect();
    for m in &ordered {
        validate_name(&m.name)?;
    }
    ordered.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = ordered.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(KeelError::migration(
            &pair[0].name,
            "duplicate migration name",
        ));
    }
    Ok(ordered)
}

/// Split SQL into individual statements.
///
/// Semicolons inside single-quoted strings, `--` comments and Postgres
/// dollar-quoted bodies (`$$ ... $$`, `$tag$ ... $tag$`) do not split.
/// Fragments made only of comments and whitespace are dropped.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut dollar_tag: Option<String> = None;
    let mut in_string = false;
    let mut in_comment = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }

        if in_string {
            // A doubled quote closes and immediately reopens, which is equivalent.
            if c == '\'' {
                in_string = false;
            }
            continue;
        }

        if c == '$' {
            let tag = read_dollar_tag(&mut chars, &mut current);
            match (&dollar_tag, tag) {
                (Some(open), Some(tag)) if *open == tag => dollar_tag = None,
                (None, Some(tag)) => dollar_tag = Some(tag),
                _ => {}
            }
            continue;
        }

        if dollar_tag.is_some() {
            continue;
        }

        match c {
            '\'' => in_string = true,
            '-' if chars.peek() == Some(&'-') => in_comment = true,
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => {}
        }
    }

    push_statement(&mut statements, &current);
    statements
}

/// Consume the rest of a `$tag$` delimiter after the leading `$`.
///
/// Returns the full tag when the characters form one; `$1`-style parameters
/// return `None`.
fn read_dollar_tag(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    current: &mut String,
) -> Option<String> {
    let mut tag = String::from("$");
    while let Some(&next) = chars.peek() {
        if next == '$' {
            chars.next();
            current.push(next);
            tag.push(next);
            return Some(tag);
        }
        if next.is_alphanumeric() || next == '_' {
            chars.next();
            current.push(next);
            tag.push(next);
        } else {
            break;
        }
    }
    None
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let stmt = raw.trim().trim_end_matches(';').trim();
    let only_comments = stmt.lines().all(|l| {
        let l = l.trim();
        l.is_empty() || l.starts_with("--")
    });
    if !only_comments {
        statements.push(stmt.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_new() {
        let m = Migration::new("0001_init", "SELECT 1");
        assert_eq!(m.name, "0001_init");
        assert_eq!(m.version(), "0001");
        assert!(!m.is_reversible());
    }

    #[test]
    fn test_parse_with_down_section() {
        let content = "CREATE TABLE t (id INT);\n-- keel:down\nDROP TABLE t;\n";
        let m = Migration::parse("0001_t", content);
        assert_eq!(m.up_statements(), vec!["CREATE TABLE t (id INT)"]);
        assert_eq!(m.down_statements(), Some(vec!["DROP TABLE t".to_string()]));
    }

    #[test]
    fn test_parse_blank_or_comment_only_down_section() {
        let m = Migration::parse("0001_t", "SELECT 1;\n-- KEEL:DOWN\n\n-- nothing\n");
        assert_eq!(m.down_statements(), Some(vec![]));
        assert!(Migration::parse("0002_t", "SELECT 1;\n-- keel:down\n   \n").down.is_none());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("20250825074000_init_my_schema").is_ok());
        assert!(validate_name("0001-add.v2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("0001_x'; DROP TABLE y; --").is_err());
        assert!(validate_name(&"a".repeat(256)).is_err());
    }

    #[test]
    fn test_order_migrations_sorts_by_name() {
        let migrations = vec![
            Migration::new("0003_c", "SELECT 3"),
            Migration::new("0001_a", "SELECT 1"),
            Migration::new("0002_b", "SELECT 2"),
        ];
        let ordered = order_migrations(&migrations).unwrap();
        let names: Vec<_> = ordered.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["0001_a", "0002_b", "0003_c"]);
    }

    #[test]
    fn test_order_migrations_rejects_duplicates() {
        let migrations = vec![
            Migration::new("0001_a", "SELECT 1"),
            Migration::new("0001_a", "SELECT 2"),
        ];
        let err = order_migrations(&migrations).unwrap_err();
        assert!(matches!(err, KeelError::Migration { ref name, .. } if name == "0001_a"));
    }

    #[test]
    fn test_split_simple_statements() {
        let stmts = split_sql_statements("SELECT 1; SELECT 2; SELECT 3;");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn test_split_keeps_last_statement_without_semicolon() {
        let stmts = split_sql_statements("SELECT 1;\nSELECT 2");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_split_ignores_semicolons_in_strings_and_comments() {
        let sql = "INSERT INTO t VALUES ('a;b', 'it''s');\n-- drop; this\nSELECT 2;";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "INSERT INTO t VALUES ('a;b', 'it''s')");
        assert!(stmts[1].ends_with("SELECT 2"));
    }

    #[test]
    fn test_split_with_dollar_quoted_function() {
        let sql = r#"
CREATE FUNCTION test() RETURNS void AS $$
BEGIN
    SELECT 1;
    SELECT 2;
END;
$$ LANGUAGE plpgsql;

SELECT 3;
"#;
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("CREATE FUNCTION"));
        assert!(stmts[0].contains("$$ LANGUAGE plpgsql"));
        assert!(stmts[1].contains("SELECT 3"));
    }

    #[test]
    fn test_split_with_named_dollar_tag_and_params() {
        let sql = "CREATE FUNCTION f() RETURNS int AS $body$ SELECT $1; $body$ LANGUAGE sql; SELECT 4;";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].ends_with("LANGUAGE sql"));
    }

    #[test]
    fn test_split_drops_comment_only_fragments() {
        let stmts = split_sql_statements("-- header\n\n;SELECT 1;\n-- trailing\n");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }
}
