//! Runs seeders in registration order, isolating each one.
//!
//! A seeder that returns an error or panics is recorded as failed and the
//! next seeder still runs. The runner keeps no "already seeded" state;
//! seeders detect their own prior work.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tracing::{info, warn};

use keel_core::error::KeelError;
use keel_core::{ConnectionHandle, Seeder};

/// Result of one seeder invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeedOutcome {
    Succeeded,
    Failed { error: String },
}

impl SeedOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SeedOutcome::Succeeded)
    }
}

/// Name and outcome of one seeder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeederReport {
    pub name: String,
    pub outcome: SeedOutcome,
}

impl SeederReport {
    /// The failure as a [`KeelError::Seeder`], if the seeder failed.
    pub fn error(&self) -> Option<KeelError> {
        match &self.outcome {
            SeedOutcome::Succeeded => None,
            SeedOutcome::Failed { error } => Some(KeelError::Seeder {
                name: self.name.clone(),
                message: error.clone(),
            }),
        }
    }
}

/// Ordered collection of seeders.
#[derive(Default, Clone)]
pub struct SeederRunner {
    seeders: Vec<Arc<dyn Seeder>>,
}

impl SeederRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, seeder: Arc<dyn Seeder>) {
        self.seeders.push(seeder);
    }

    pub fn with(mut self, seeder: impl Seeder + 'static) -> Self {
        self.register(Arc::new(seeder));
        self
    }

    pub fn len(&self) -> usize {
        self.seeders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeders.is_empty()
    }

    pub async fn run_all(&self, conn: &dyn ConnectionHandle) -> Vec<SeederReport> {
        run_seeders(conn, &self.seeders).await
    }
}

impl From<Vec<Arc<dyn Seeder>>> for SeederRunner {
    fn from(seeders: Vec<Arc<dyn Seeder>>) -> Self {
        Self { seeders }
    }
}

/// Invoke every seeder once, in order, and report each outcome.
pub async fn run_seeders(
    conn: &dyn ConnectionHandle,
    seeders: &[Arc<dyn Seeder>],
) -> Vec<SeederReport> {
    let mut reports = Vec::with_capacity(seeders.len());

    for seeder in seeders {
        let name = seeder.name().to_string();
        info!("Running seeder: {}", name);

        let outcome = match AssertUnwindSafe(seeder.seed(conn)).catch_unwind().await {
            Ok(Ok(())) => SeedOutcome::Succeeded,
            Ok(Err(e)) => SeedOutcome::Failed {
                error: e.to_string(),
            },
            Err(panic) => SeedOutcome::Failed {
                error: format!("panicked: {}", panic_message(panic.as_ref())),
            },
        };

        if let SeedOutcome::Failed { error } = &outcome {
            warn!(seeder = %name, "Seeder failed, continuing: {}", error);
        }
        reports.push(SeederReport { name, outcome });
    }

    reports
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
