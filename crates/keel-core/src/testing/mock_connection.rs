//! In-memory stand-in for a target database.
//!
//! `MockConnection` understands just enough SQL to exercise the bootstrap
//! stages: `CREATE TABLE` / `DROP TABLE`, single-row `INSERT`, `DELETE` with
//! `col = value` conditions joined by `AND`, `SELECT col FROM table` (returns
//! the first inserted value of every row, in insertion order) and the catalog
//! lookups issued by the schema prober. Anything else succeeds with zero rows
//! affected. Every statement is recorded in a journal. A missing SQLite
//! database comes into existence on the first statement, as the real file
//! would.
//!
//! Rows are stamped with a simulated clock that only moves through
//! [`MockConnection::advance_clock`]. A `col < <expr>` condition matches rows
//! stamped more than N seconds ago, N being the first number in `<expr>`, so
//! `acquired_at < NOW() - INTERVAL '600 seconds'` works on every dialect.
//!
//! Clones share state, so two clones behave like two processes pointed at
//! the same database.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use regex_lite::Regex;

use crate::connection::ConnectionHandle;
use crate::engine::EngineKind;
use crate::error::{KeelError, Result};

/// How the engine-native "create database" primitive behaves.
#[derive(Debug, Clone)]
enum CreateBehavior {
    Succeed,
    Fail(String),
    /// Fails, but a concurrent process creates the database at the same moment.
    LoseRace(String),
}

#[derive(Debug, Clone)]
struct MockRow {
    columns: BTreeMap<String, String>,
    first: String,
    stamped_at: u64,
}

type Tables = BTreeMap<String, Vec<MockRow>>;

#[derive(Debug)]
struct MockState {
    database_exists: bool,
    network_up: bool,
    connect_script: VecDeque<bool>,
    create: CreateBehavior,
    create_calls: usize,
    databases_created: usize,
    tables: Tables,
    clock_secs: u64,
    failures: Vec<(String, String)>,
    catalog_fails: bool,
    journal: Vec<String>,
}

/// Mock connection handle for testing.
#[derive(Clone)]
pub struct MockConnection {
    engine: EngineKind,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    /// An existing, reachable, empty database.
    pub fn new(engine: EngineKind) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(MockState {
                database_exists: true,
                network_up: true,
                connect_script: VecDeque::new(),
                create: CreateBehavior::Succeed,
                create_calls: 0,
                databases_created: 0,
                tables: BTreeMap::new(),
                clock_secs: 0,
                failures: Vec::new(),
                catalog_fails: false,
                journal: Vec::new(),
            })),
        }
    }

    /// A server that is up but does not hold the target database yet.
    pub fn missing(engine: EngineKind) -> Self {
        let conn = Self::new(engine);
        conn.lock().database_exists = false;
        conn
    }

    /// Pre-create a table.
    pub fn with_table(self, name: &str) -> Self {
        self.lock().tables.entry(name.to_string()).or_default();
        self
    }

    /// Make every connection attempt fail.
    pub fn with_network_down(self) -> Self {
        self.lock().network_up = false;
        self
    }

    /// Results returned by the next `can_connect` calls, before falling back
    /// to the simulated state.
    pub fn with_connect_script(self, script: impl IntoIterator<Item = bool>) -> Self {
        self.lock().connect_script.extend(script);
        self
    }

    /// Statements containing `needle` fail with `message`.
    pub fn fail_on(self, needle: &str, message: &str) -> Self {
        self.lock()
            .failures
            .push((needle.to_string(), message.to_string()));
        self
    }

    /// Catalog queries issued by the schema prober fail.
    pub fn fail_catalog_queries(self) -> Self {
        self.lock().catalog_fails = true;
        self
    }

    /// The create-database primitive fails with `message`.
    pub fn create_fails(self, message: &str) -> Self {
        self.lock().create = CreateBehavior::Fail(message.to_string());
        self
    }

    /// The create-database primitive fails because another process created
    /// the database concurrently.
    pub fn create_loses_race(self, message: &str) -> Self {
        self.lock().create = CreateBehavior::LoseRace(message.to_string());
        self
    }

    /// Move the simulated clock forward.
    pub fn advance_clock(&self, by: Duration) {
        self.lock().clock_secs += by.as_secs();
    }

    /// Every statement executed so far, in order.
    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    /// Whether any journaled statement contains `needle`.
    pub fn executed(&self, needle: &str) -> bool {
        self.lock().journal.iter().any(|s| s.contains(needle))
    }

    /// Number of journaled statements containing `needle`.
    pub fn count_executed(&self, needle: &str) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    /// How many times the database was actually created through this mock.
    pub fn databases_created(&self) -> usize {
        self.lock().databases_created
    }

    pub fn database_exists(&self) -> bool {
        self.lock().database_exists
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.lock().tables.contains_key(name)
    }

    /// First-column values of every row in `table`.
    pub fn rows(&self, table: &str) -> Vec<String> {
        self.column(table, None)
    }

    /// Values of `column` in every row of `table` that has it.
    pub fn values(&self, table: &str, column: &str) -> Vec<String> {
        self.column(table, Some(column))
    }

    fn column(&self, table: &str, column: Option<&str>) -> Vec<String> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| match column {
                        Some(c) => row.columns.get(c).cloned(),
                        None => Some(row.first.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run(&self, statements: &[String]) -> Result<(u64, Vec<String>)> {
        let mut state = self.lock();
        if !state.network_up {
            return Err(KeelError::Database("connection refused".into()));
        }
        if !state.database_exists {
            // File-backed engines create the database on first use.
            if !self.engine.is_file_backed() {
                return Err(KeelError::Database("database does not exist".into()));
            }
            state.database_exists = true;
        }

        // Work on a copy so a failing statement rolls the whole batch back.
        let mut tables = state.tables.clone();
        let mut affected = 0;
        let mut rows = Vec::new();
        for sql in statements {
            state.journal.push(sql.clone());
            if let Some((_, message)) = state.failures.iter().find(|(n, _)| sql.contains(n.as_str())) {
                return Err(KeelError::Database(message.clone()));
            }
            if is_catalog_query(sql) && state.catalog_fails {
                return Err(KeelError::Database("permission denied for catalog".into()));
            }
            let (n, r) = apply(&mut tables, sql, self.engine, state.clock_secs)?;
            affected += n;
            rows = r;
        }
        state.tables = tables;
        Ok((affected, rows))
    }
}

impl ConnectionHandle for MockConnection {
    fn engine(&self) -> EngineKind {
        self.engine
    }

    fn can_connect(&self) -> BoxFuture<'_, bool> {
        async move {
            YieldNow::default().await;
            let mut state = self.lock();
            match state.connect_script.pop_front() {
                Some(scripted) => scripted,
                None => state.network_up && state.database_exists,
            }
        }
        .boxed()
    }

    fn execute_raw<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64>> {
        async move {
            YieldNow::default().await;
            self.run(&[sql.to_string()]).map(|(n, _)| n)
        }
        .boxed()
    }

    fn execute_atomic<'a>(&'a self, statements: &'a [String]) -> BoxFuture<'a, Result<u64>> {
        async move {
            YieldNow::default().await;
            self.run(statements).map(|(n, _)| n)
        }
        .boxed()
    }

    fn query_column<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        async move {
            YieldNow::default().await;
            self.run(&[sql.to_string()]).map(|(_, rows)| rows)
        }
        .boxed()
    }

    fn create_database(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            YieldNow::default().await;
            let mut state = self.lock();
            state.create_calls += 1;
            if !state.network_up {
                return Err(KeelError::Database("connection refused".into()));
            }
            match state.create.clone() {
                CreateBehavior::Fail(message) => Err(KeelError::Database(message)),
                CreateBehavior::LoseRace(message) => {
                    state.database_exists = true;
                    Err(KeelError::Database(message))
                }
                CreateBehavior::Succeed if state.database_exists => {
                    Err(KeelError::Database("database already exists".into()))
                }
                CreateBehavior::Succeed => {
                    state.database_exists = true;
                    state.databases_created += 1;
                    Ok(())
                }
            }
        }
        .boxed()
    }
}

/// Yields once so that concurrently polled mock calls interleave.
#[derive(Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

struct Patterns {
    create: Regex,
    drop: Regex,
    insert: Regex,
    delete: Regex,
    select: Regex,
    in_list: Regex,
    literal: Regex,
    and: Regex,
    equals: Regex,
    older_than: Regex,
    number: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let ident = r#"["`\[]?(\w+)["`\]]?"#;
        let compile = |p: String| Regex::new(&p).unwrap_or_else(|e| panic!("bad pattern {}: {}", p, e));
        Patterns {
            create: compile(format!(r"(?i)CREATE TABLE (?:IF NOT EXISTS )?{}", ident)),
            drop: compile(format!(r"(?i)^DROP TABLE (?:IF EXISTS )?{}", ident)),
            insert: compile(format!(r"(?is)^INSERT INTO {}\s*(?:\(([^)]*)\))?\s*(?:VALUES\s*\((.*)\)|SELECT\s+([^,]+?)[,\s])", ident)),
            delete: compile(format!(r"(?is)^DELETE FROM {}(?:\s+WHERE\s+(.*))?$", ident)),
            select: compile(format!(r"(?is)^SELECT\s+(?:CAST\()?\w+.*?\s+FROM\s+{}", ident)),
            in_list: compile(r"(?is)IN\s*\(([^)]*)\)".to_string()),
            literal: compile(r"'((?:[^']|'')*)'".to_string()),
            and: compile(r"(?i)\s+AND\s+".to_string()),
            equals: compile(r"(?s)^(\w+)\s*=\s*('(?:[^']|'')*'|\S+)$".to_string()),
            older_than: compile(r"(?s)^(\w+)\s*<\s*(.+)$".to_string()),
            number: compile(r"\d+".to_string()),
        }
    })
}

fn is_catalog_query(sql: &str) -> bool {
    let lower = sql.to_ascii_lowercase();
    lower.contains("pg_tables") || lower.contains("information_schema") || lower.contains("sqlite_master")
}

fn literal_value(raw: &str) -> String {
    let raw = raw.trim();
    match raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => raw.to_string(),
    }
}

fn no_such_table(name: &str) -> KeelError {
    KeelError::Database(format!("no such table: {}", name))
}

/// Split the first row of a `VALUES (...)` body on commas outside quoted
/// literals and nested parentheses.
fn split_values(body: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted && depth == 0 => break,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                values.push(literal_value(&std::mem::take(&mut current)));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        values.push(literal_value(&current));
    }
    values
}

fn column_name(raw: &str) -> String {
    raw.trim().trim_matches(|c| matches!(c, '"' | '`' | '[' | ']')).to_string()
}

/// Whether `row` satisfies every `AND`-joined condition in `clause`.
fn row_matches(row: &MockRow, clause: &str, now: u64) -> Result<bool> {
    let p = patterns();
    for condition in p.and.split(clause.trim()) {
        let condition = condition.trim();
        if let Some(cap) = p.equals.captures(condition) {
            if row.columns.get(&cap[1]) != Some(&literal_value(&cap[2])) {
                return Ok(false);
            }
        } else if let Some(cap) = p.older_than.captures(condition) {
            let age: u64 = p
                .number
                .find(&cap[2])
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(|| KeelError::Database(format!("unsupported cutoff: {}", condition)))?;
            match now.checked_sub(age) {
                Some(cutoff) if row.stamped_at < cutoff => {}
                _ => return Ok(false),
            }
        } else {
            return Err(KeelError::Database(format!(
                "unsupported condition: {}",
                condition
            )));
        }
    }
    Ok(true)
}

/// Apply one statement to the simulated tables.
fn apply(tables: &mut Tables, sql: &str, engine: EngineKind, now: u64) -> Result<(u64, Vec<String>)> {
    let p = patterns();
    let sql = sql.trim();

    if is_catalog_query(sql) {
        let fold = engine.folds_identifier_case();
        let found = p
            .in_list
            .captures(sql)
            .map(|cap| {
                p.literal
                    .captures_iter(&cap[1])
                    .filter_map(|lit| {
                        let name = lit[1].replace("''", "'");
                        tables
                            .keys()
                            .find(|t| **t == name || (fold && t.eq_ignore_ascii_case(&name)))
                            .cloned()
                    })
                    .collect()
            })
            .unwrap_or_default();
        return Ok((0, found));
    }

    if let Some(cap) = p.create.captures(sql) {
        let name = cap[1].to_string();
        let if_not_exists = sql.to_ascii_uppercase().contains("IF NOT EXISTS")
            || sql.to_ascii_uppercase().starts_with("IF ");
        if tables.contains_key(&name) && !if_not_exists {
            return Err(KeelError::Database(format!("table {} already exists", name)));
        }
        tables.entry(name).or_default();
        return Ok((0, Vec::new()));
    }

    if let Some(cap) = p.drop.captures(sql) {
        let name = &cap[1];
        if tables.remove(name).is_none() && !sql.to_ascii_uppercase().contains("IF EXISTS") {
            return Err(no_such_table(name));
        }
        return Ok((0, Vec::new()));
    }

    if let Some(cap) = p.insert.captures(sql) {
        let name = &cap[1];
        let names: Vec<String> = cap
            .get(2)
            .map(|m| m.as_str().split(',').map(column_name).collect())
            .unwrap_or_default();
        let values = match (cap.get(3), cap.get(4)) {
            (Some(body), _) => split_values(body.as_str()),
            (None, Some(selected)) => vec![literal_value(selected.as_str())],
            (None, None) => Vec::new(),
        };
        let row = MockRow {
            columns: names.into_iter().zip(values.iter().cloned()).collect(),
            first: values.first().cloned().unwrap_or_default(),
            stamped_at: now,
        };

        let rows = tables.get_mut(name).ok_or_else(|| no_such_table(name))?;
        if rows.iter().any(|r| r.first == row.first) {
            return Err(KeelError::Database(format!(
                "duplicate key value '{}' violates unique constraint on {}",
                row.first, name
            )));
        }
        rows.push(row);
        return Ok((1, Vec::new()));
    }

    if let Some(cap) = p.delete.captures(sql) {
        let name = &cap[1];
        let rows = tables.get_mut(name).ok_or_else(|| no_such_table(name))?;
        let before = rows.len();
        match cap.get(2) {
            Some(clause) => {
                let mut kept = Vec::with_capacity(before);
                for row in rows.drain(..) {
                    if !row_matches(&row, clause.as_str(), now)? {
                        kept.push(row);
                    }
                }
                *rows = kept;
            }
            None => rows.clear(),
        }
        return Ok(((before - rows.len()) as u64, Vec::new()));
    }

    if let Some(cap) = p.select.captures(sql) {
        let name = &cap[1];
        let rows = tables.get(name).ok_or_else(|| no_such_table(name))?;
        return Ok((0, rows.iter().map(|r| r.first.clone()).collect()));
    }

    Ok((0, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tables_and_rows() {
        let conn = MockConnection::new(EngineKind::Postgres);
        conn.execute_raw("CREATE TABLE IF NOT EXISTS \"user\" (id INT)")
            .await
            .unwrap();
        let n = conn
            .execute_raw("INSERT INTO \"user\" (username) VALUES ('admin')")
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert!(conn.has_table("user"));
        assert_eq!(conn.rows("user"), vec!["admin"]);

        let names = conn.query_column("SELECT username FROM \"user\"").await.unwrap();
        assert_eq!(names, vec!["admin"]);
    }

    #[tokio::test]
    async fn test_atomic_batch_rolls_back() {
        let conn = MockConnection::new(EngineKind::Sqlite).fail_on("boom", "syntax error");
        let batch = vec![
            "CREATE TABLE posts (id INT)".to_string(),
            "SELECT boom".to_string(),
        ];
        assert!(conn.execute_atomic(&batch).await.is_err());
        assert!(!conn.has_table("posts"));
        assert_eq!(conn.journal().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let conn = MockConnection::new(EngineKind::MySql).with_table("lock");
        conn.execute_raw("INSERT INTO lock (id, owner) VALUES (1, 'a')")
            .await
            .unwrap();
        let err = conn
            .execute_raw("INSERT INTO lock (id, owner) VALUES (1, 'b')")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let removed = conn
            .execute_raw("DELETE FROM lock WHERE id = '1'")
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_delete_honours_every_condition() {
        let conn = MockConnection::new(EngineKind::Postgres).with_table("lock");
        conn.execute_raw("INSERT INTO lock (id, owner) VALUES (1, 'host-a:1:x')")
            .await
            .unwrap();

        let removed = conn
            .execute_raw("DELETE FROM lock WHERE id = 1 AND owner = 'host-b:2:y'")
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(conn.values("lock", "owner"), vec!["host-a:1:x"]);

        let removed = conn
            .execute_raw("DELETE FROM lock WHERE id = 1 AND owner = 'host-a:1:x'")
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_age_condition_follows_simulated_clock() {
        let conn = MockConnection::new(EngineKind::Sqlite).with_table("lock");
        conn.execute_raw("INSERT INTO lock (id, owner) VALUES (1, 'a')")
            .await
            .unwrap();

        let expire = "DELETE FROM lock WHERE id = 1 AND acquired_at < datetime('now', '-600 seconds')";
        assert_eq!(conn.execute_raw(expire).await.unwrap(), 0);
        conn.advance_clock(Duration::from_secs(601));
        assert_eq!(conn.execute_raw(expire).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_multi_row_insert_keeps_first_row() {
        let conn = MockConnection::new(EngineKind::Sqlite).with_table("roles");
        conn.execute_raw("INSERT INTO roles (name, rank) VALUES ('admin', 1), ('member', 2)")
            .await
            .unwrap();
        assert_eq!(conn.rows("roles"), vec!["admin"]);
        assert_eq!(conn.values("roles", "rank"), vec!["1"]);
    }

    #[tokio::test]
    async fn test_catalog_lookup_folds_case_like_the_engine() {
        let sql = "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME IN ('users')";
        let mssql = MockConnection::new(EngineKind::SqlServer).with_table("Users");
        assert_eq!(mssql.query_column(sql).await.unwrap(), vec!["Users"]);

        let pg = MockConnection::new(EngineKind::Postgres).with_table("Users");
        assert!(pg.query_column(sql).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_lookup() {
        let conn = MockConnection::new(EngineKind::Sqlite).with_table("user");
        let found = conn
            .query_column("SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('user', 'role')")
            .await
            .unwrap();
        assert_eq!(found, vec!["user"]);
    }

    #[tokio::test]
    async fn test_missing_database_rejects_queries() {
        let conn = MockConnection::missing(EngineKind::Postgres);
        assert!(!conn.can_connect().await);
        assert!(conn.execute_raw("SELECT 1").await.is_err());

        conn.create_database().await.unwrap();
        assert!(conn.can_connect().await);
        assert_eq!(conn.databases_created(), 1);
        assert!(conn.create_database().await.is_err());
        assert_eq!(conn.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_file_appears_on_first_write() {
        let conn = MockConnection::missing(EngineKind::Sqlite);
        assert!(!conn.can_connect().await);
        conn.execute_raw("CREATE TABLE t (id INT)").await.unwrap();
        assert!(conn.database_exists());
        assert!(conn.can_connect().await);
        assert_eq!(conn.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_connect_script() {
        let conn = MockConnection::new(EngineKind::Postgres).with_connect_script([false, true]);
        assert!(!conn.can_connect().await);
        assert!(conn.can_connect().await);
        assert!(conn.can_connect().await);
    }
}
