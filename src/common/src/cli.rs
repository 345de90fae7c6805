use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all rollcall binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Common subcommands available for all services
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the service (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Log level selected by the verbosity flags
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments. `RUST_LOG` still wins when set.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let mut redacted = config.clone();
            if redacted.registry.password.is_some() {
                redacted.registry.password = Some("********".to_string());
            }
            let json = serde_json::to_string_pretty(&redacted)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("rollcall Configuration:");
            println!("=======================");
            println!(
                "Registry store: {}:{} (password {})",
                config.registry.host,
                config.registry.port,
                if config.registry.password.is_some() {
                    "set"
                } else {
                    "not set"
                }
            );
            println!("Membership set: {}", config.registry.membership_set);
            println!("Record ttl: {:?}", config.registry.ttl);
            println!("Heartbeat interval: {:?}", config.registry.heartbeat_interval);
            println!("Operation timeout: {:?}", config.registry.operation_timeout);
            println!(
                "Instance id: {}",
                config.instance.id.as_deref().unwrap_or("<generated>")
            );
            println!(
                "Instance address: {}",
                config.instance.address.as_deref().unwrap_or("<derived>")
            );
            println!("HTTP listener: {}:{}", config.http.bind, config.http.port);
            println!("Backend call timeout: {:?}", config.http.client_timeout);
            println!("Database DSN: {}", config.database.dsn);
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");
        config.validate()?;
        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle common CLI commands that don't require starting services
    pub async fn handle_common_command(
        command: &CommonCommands,
        config: &Configuration,
    ) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Start => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    #[test]
    fn test_common_commands_default() {
        let default_cmd = CommonCommands::default();
        assert!(matches!(default_cmd, CommonCommands::Start));
    }

    #[test]
    fn test_version_info() {
        let version = utils::version_info();
        assert!(version.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_log_level_flags() {
        let mut args = CommonArgs {
            config: None,
            verbose: false,
            quiet: false,
        };
        assert_eq!(utils::log_level(&args), "info");
        args.verbose = true;
        assert_eq!(utils::log_level(&args), "debug");
        args.quiet = true;
        assert_eq!(utils::log_level(&args), "warn");
    }

    #[tokio::test]
    async fn test_start_is_not_handled() {
        let config = Configuration::default();
        let handled = utils::handle_common_command(&CommonCommands::Start, &config)
            .await
            .unwrap();
        assert!(!handled);
    }

    #[tokio::test]
    async fn test_validate_command_fails_on_bad_config() {
        let mut config = Configuration::default();
        config.registry.heartbeat_interval = config.registry.ttl;
        let result = utils::handle_common_command(&CommonCommands::Validate, &config).await;
        assert!(result.is_err());
    }
}
