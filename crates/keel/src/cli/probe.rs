use anyhow::Result;
use clap::Parser;
use console::style;

use keel_runtime::SchemaProbe;

use super::GlobalArgs;

/// Check whether the marker tables exist. Never modifies the database.
#[derive(Parser)]
pub struct ProbeCommand {}

impl ProbeCommand {
    pub async fn execute(self, global: &GlobalArgs) -> Result<()> {
        let keel = global.load()?;
        let engine = keel.config().database.engine();

        let line = match keel.probe().await? {
            SchemaProbe::Skipped => format!("{} No marker tables configured", style("ℹ").blue()),
            SchemaProbe::Unreachable => {
                format!("{} {} database is unreachable", style("✗").red(), engine)
            }
            SchemaProbe::NotDetected => format!("{} Schema not detected", style("○").yellow()),
            SchemaProbe::Detected { tables } => format!(
                "{} Schema detected on {}: {}",
                style("✓").green(),
                engine,
                tables.join(", ")
            ),
        };
        println!("  {}", line);
        Ok(())
    }
}
