mod bootstrap;
mod down;
mod probe;
mod status;

pub use bootstrap::BootstrapCommand;
pub use down::DownCommand;
pub use probe::ProbeCommand;
pub use status::StatusCommand;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use keel::Keel;
use keel_core::config::KeelConfig;

/// keel - idempotent database bootstrap
#[derive(Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Provision, migrate and seed the configured database.
    Bootstrap(BootstrapCommand),

    /// Show applied and pending migrations.
    Status(StatusCommand),

    /// Roll back the most recent migrations.
    Down(DownCommand),

    /// Check whether the marker tables exist.
    Probe(ProbeCommand),
}

/// Options shared by every command.
#[derive(Args, Clone)]
pub struct GlobalArgs {
    /// Configuration file path.
    #[arg(short, long, default_value = "keel.toml", global = true)]
    pub config: PathBuf,

    /// Migrations directory path (overrides config).
    #[arg(short, long, global = true)]
    pub migrations_dir: Option<PathBuf>,
}

impl GlobalArgs {
    /// Load `.env` and the config file, install logging and build a [`Keel`].
    pub fn load(&self) -> Result<Keel> {
        // Load .env if present
        dotenvy::dotenv().ok();

        if !Path::new(&self.config).exists() {
            anyhow::bail!("Configuration file not found: {}", self.config.display());
        }
        let config = KeelConfig::from_file(&self.config)?;
        keel::logging::init(&config.logging)?;

        let mut builder = Keel::builder().config(config);
        if let Some(dir) = &self.migrations_dir {
            builder = builder.migrations_dir(dir);
        }
        Ok(builder.build()?)
    }
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Bootstrap(cmd) => cmd.execute(&self.global).await,
            Commands::Status(cmd) => cmd.execute(&self.global).await,
            Commands::Down(cmd) => cmd.execute(&self.global).await,
            Commands::Probe(cmd) => cmd.execute(&self.global).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_bootstrap() {
        let cli = Cli::try_parse_from(["keel", "bootstrap", "--json"]).unwrap();
        assert_eq!(cli.global.config, PathBuf::from("keel.toml"));
        assert!(matches!(cli.command, Commands::Bootstrap(BootstrapCommand { json: true })));
    }

    #[test]
    fn test_cli_parse_down_defaults_to_one() {
        let cli = Cli::try_parse_from(["keel", "down"]).unwrap();
        assert!(matches!(cli.command, Commands::Down(DownCommand { count: 1 })));

        let cli = Cli::try_parse_from(["keel", "down", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Down(DownCommand { count: 3 })));
    }

    #[test]
    fn test_cli_global_args_after_subcommand() {
        let cli = Cli::try_parse_from([
            "keel",
            "status",
            "--config",
            "deploy/keel.toml",
            "--migrations-dir",
            "db/migrations",
        ])
        .unwrap();
        assert_eq!(cli.global.config, PathBuf::from("deploy/keel.toml"));
        assert_eq!(cli.global.migrations_dir, Some(PathBuf::from("db/migrations")));
    }

    #[test]
    fn test_missing_config_file() {
        let args = GlobalArgs {
            config: PathBuf::from("/nonexistent/keel.toml"),
            migrations_dir: None,
        };
        let err = args.load().err().unwrap();
        assert!(err.to_string().contains("Configuration file not found"));
    }
}
