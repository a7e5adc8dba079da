//! Assertion macros for bootstrap tests.

/// Assert that a result is an error of the given variant.
///
/// ```ignore
/// assert_err_variant!(result, KeelError::Migration { .. });
/// ```
#[macro_export]
macro_rules! assert_err_variant {
    ($expr:expr, $variant:pat) => {
        match &$expr {
            Err($variant) => (),
            Err(e) => panic!(
                "assertion failed: expected {}, got {:?}",
                stringify!($variant),
                e
            ),
            Ok(v) => panic!(
                "assertion failed: expected Err({}), got Ok({:?})",
                stringify!($variant),
                v
            ),
        }
    };
}

/// Assert that a mock connection executed a statement containing `needle`.
///
/// ```ignore
/// assert_sql_executed!(conn, "CREATE TABLE user");
/// ```
#[macro_export]
macro_rules! assert_sql_executed {
    ($conn:expr, $needle:expr) => {
        if !$conn.executed($needle) {
            panic!(
                "assertion failed: no statement containing {:?} in journal {:#?}",
                $needle,
                $conn.journal()
            );
        }
    };
}

/// Assert that a mock connection never executed a statement containing `needle`.
#[macro_export]
macro_rules! assert_sql_not_executed {
    ($conn:expr, $needle:expr) => {
        if $conn.executed($needle) {
            panic!(
                "assertion failed: statement containing {:?} found in journal {:#?}",
                $needle,
                $conn.journal()
            );
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::engine::EngineKind;
    use crate::error::KeelError;
    use crate::testing::MockConnection;
    use crate::ConnectionHandle;

    #[test]
    fn test_err_variant_matches() {
        let result: Result<(), KeelError> = Err(KeelError::Lock("held".into()));
        assert_err_variant!(result, KeelError::Lock(_));
    }

    #[test]
    #[should_panic(expected = "got Lock(\"held\")")]
    fn test_err_variant_reports_the_actual_error() {
        let result: Result<(), KeelError> = Err(KeelError::Lock("held".into()));
        assert_err_variant!(result, KeelError::Config(_));
    }

    #[tokio::test]
    async fn test_journal_assertions() {
        let conn = MockConnection::new(EngineKind::Postgres);
        conn.execute_raw("CREATE TABLE posts (id INT)").await.unwrap();
        assert_sql_executed!(conn, "CREATE TABLE posts");
        assert_sql_not_executed!(conn, "DROP TABLE");
    }

    #[tokio::test]
    #[should_panic(expected = "no statement containing")]
    async fn test_missing_statement_panics() {
        let conn = MockConnection::new(EngineKind::Sqlite);
        assert_sql_executed!(conn, "CREATE TABLE posts");
    }
}
