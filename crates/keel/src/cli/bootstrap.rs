use anyhow::Result;
use clap::Parser;
use console::style;

use keel_runtime::{ProvisionOutcome, SchemaProbe, SeedOutcome};

use super::GlobalArgs;

/// Provision, migrate and seed the configured database.
#[derive(Parser)]
pub struct BootstrapCommand {
    /// Print the result as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

impl BootstrapCommand {
    pub async fn execute(self, global: &GlobalArgs) -> Result<()> {
        let keel = global.load()?;
        let result = keel.bootstrap().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }

        println!();
        println!(
            "  {}  {} v{}",
            style("⚓").bold(),
            style("keel").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!();

        let engine = keel.config().database.engine();
        let provision = match result.provision {
            ProvisionOutcome::AlreadyExists => "database exists".to_string(),
            ProvisionOutcome::SelfCreating => format!("{} file created on first write", engine),
            ProvisionOutcome::Created => "database created".to_string(),
            ProvisionOutcome::CreatedConcurrently => "database created by another process".to_string(),
        };
        println!("  {} {}", style("✓").green(), provision);

        match &result.schema {
            SchemaProbe::Detected { tables } => println!(
                "  {} Existing schema detected ({})",
                style("ℹ").blue(),
                tables.join(", ")
            ),
            SchemaProbe::Skipped => {}
            _ => println!("  {} No existing schema detected", style("ℹ").blue()),
        }

        if result.applied_migrations.is_empty() {
            println!("  {} Schema is up to date", style("✓").green());
        } else {
            for name in &result.applied_migrations {
                println!("  {} Applied: {}", style("✓").green(), name);
            }
        }

        for report in &result.seeder_outcomes {
            match &report.outcome {
                SeedOutcome::Succeeded => {
                    println!("  {} Seeded: {}", style("✓").green(), report.name)
                }
                SeedOutcome::Failed { error } => println!(
                    "  {} Seeder {} failed: {}",
                    style("⚠").yellow(),
                    report.name,
                    error
                ),
            }
        }

        println!();
        println!(
            "  {} Bootstrap complete in {}ms",
            style("✓").green().bold(),
            result.elapsed_ms
        );
        println!();
        Ok(())
    }
}
