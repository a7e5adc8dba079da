//! Seeder stage: SQL seed files and the isolating runner.

mod runner;
mod sql;

pub use runner::{run_seeders, SeedOutcome, SeederReport, SeederRunner};
pub use sql::{load_seeders_from_dir, SqlSeeder};
