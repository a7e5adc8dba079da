use anyhow::Result;
use clap::Parser;
use console::style;

use super::GlobalArgs;

/// Roll back the most recent migrations.
#[derive(Parser)]
pub struct DownCommand {
    /// Number of migrations to rollback.
    #[arg(default_value = "1")]
    pub count: usize,
}

impl DownCommand {
    pub async fn execute(self, global: &GlobalArgs) -> Result<()> {
        let keel = global.load()?;

        println!();
        if self.count == 0 {
            println!("  {} Nothing to rollback (count=0)", style("ℹ").blue());
            return Ok(());
        }

        println!(
            "  {} Rolling back {} migration(s)...",
            style("→").dim(),
            self.count
        );
        let rolled_back = keel.rollback(self.count).await?;

        if rolled_back.is_empty() {
            println!("  {} No migrations to rollback", style("ℹ").blue());
        } else {
            for name in &rolled_back {
                println!("  {} Rolled back: {}", style("✓").green(), name);
            }
        }
        println!();
        Ok(())
    }
}
