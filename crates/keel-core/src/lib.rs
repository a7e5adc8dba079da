pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod marker;
pub mod migration;
pub mod seeder;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::KeelConfig;
pub use connection::ConnectionHandle;
pub use engine::EngineKind;
pub use error::{KeelError, Result};
pub use marker::MarkerSet;
pub use migration::Migration;
pub use seeder::Seeder;
