//! Testing utilities for keel.
//!
//! Every bootstrap stage talks to the database through
//! [`ConnectionHandle`](crate::ConnectionHandle), so stages can be tested
//! against [`MockConnection`] without a running database server. Integration
//! tests that need real SQL behaviour should use a temporary SQLite file.
//!
//! # Example
//!
//! ```ignore
//! use keel_core::testing::MockConnection;
//! use keel_core::EngineKind;
//!
//! #[tokio::test]
//! async fn test_probe_finds_existing_table() {
//!     let conn = MockConnection::new(EngineKind::Postgres).with_table("user");
//!     assert!(detect_schema(&conn, &MarkerSet::new(["user"])).await);
//! }
//! ```

pub mod assertions;
pub mod mock_connection;

pub use mock_connection::MockConnection;
