use anyhow::Result;
use clap::Parser;
use console::style;

use super::GlobalArgs;

/// Show applied and pending migrations.
#[derive(Parser)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(self, global: &GlobalArgs) -> Result<()> {
        let keel = global.load()?;
        let status = keel.status().await?;

        println!();
        println!("  {} Migration Status", style("keel").bold().cyan());
        println!();

        if status.applied.is_empty() && status.pending.is_empty() && status.unknown.is_empty() {
            println!("  {} No migrations found", style("ℹ").blue());
            return Ok(());
        }

        if !status.applied.is_empty() {
            println!("  {} Applied:", style("✓").green());
            for name in &status.applied {
                println!("    {}", name);
            }
        }

        if !status.pending.is_empty() {
            println!("  {} Pending:", style("○").yellow());
            for name in &status.pending {
                println!("    {}", name);
            }
        }

        // Recorded by a newer build or removed from disk.
        if !status.unknown.is_empty() {
            println!("  {} Applied but not found locally:", style("?").red());
            for name in &status.unknown {
                println!("    {}", name);
            }
        }

        println!();
        Ok(())
    }
}
