//! keel: idempotent database bootstrap.
//!
//! Brings a database that may not exist, may be being created by a sibling
//! replica, or may be partially migrated into a fully migrated and seeded
//! state before the host starts serving.
//!
//! ```no_run
//! use keel::prelude::*;
//!
//! # async fn run() -> keel::prelude::Result<()> {
//! let config = KeelConfig::from_file("keel.toml")?;
//! let keel = Keel::builder().config(config).build()?;
//! let result = keel.bootstrap().await?;
//! assert!(result.migrations_applied);
//! # Ok(())
//! # }
//! ```

pub mod logging;
mod runtime;

#[doc(hidden)]
pub use keel_core;
#[doc(hidden)]
pub use keel_runtime;

// These macros use #[macro_export] which places them at keel_core crate root.
#[cfg(feature = "testing")]
pub use keel_core::{assert_err_variant, assert_sql_executed, assert_sql_not_executed};

pub use runtime::prelude;
pub use runtime::{Keel, KeelBuilder};
