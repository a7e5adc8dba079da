//! Tracing subscriber setup for hosts and the CLI.

use tracing_subscriber::EnvFilter;

use keel_core::config::LoggingConfig;
use keel_core::error::{KeelError, Result};

/// Install a global `fmt` subscriber writing to stderr.
///
/// `RUST_LOG`, when set, takes precedence over `config.level`. Fails if a
/// global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let directives = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.level.clone());
    let filter = build_filter(&directives)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| KeelError::Config(format!("Failed to install logger: {}", e)))
}

fn build_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| KeelError::Config(format!("Invalid log level '{}': {}", directives, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter() {
        assert!(build_filter("info").is_ok());
        assert!(build_filter("keel_runtime=debug,sqlx=warn").is_ok());
        assert!(build_filter("keel=loudest").is_err());
    }
}
