//! Bootstrap stages for keel: provisioning, schema probing, migration
//! application and seeding, plus the orchestrator that sequences them.

pub mod bootstrap;
pub mod db;
pub mod migrations;
pub mod probe;
pub mod provision;
pub mod seeding;

pub use bootstrap::{bootstrap, BootstrapResult, Bootstrapper};
pub use db::SqlxConnection;
pub use migrations::{load_migrations_from_dir, MigrationApplier, MigrationStatus};
pub use probe::{detect_schema, probe_schema, SchemaProbe};
pub use provision::{ensure_database, ProvisionOutcome, Provisioner};
pub use seeding::{load_seeders_from_dir, run_seeders, SeedOutcome, SeederReport, SeederRunner, SqlSeeder};
