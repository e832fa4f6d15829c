//! Command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};

/// kvgate - multi-tenant RESP gateway for an ordered transactional store.
#[derive(Parser, Debug)]
#[command(name = "kvgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway.
    Server(commands::ServerArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_flags() {
        let cli = Cli::parse_from([
            "kvgate",
            "server",
            "--config",
            "kvgate.toml",
            "--bind",
            "127.0.0.1:7000",
            "--debug-log-commands",
            "--log-level",
            "debug",
        ]);

        assert_eq!(cli.config.as_deref(), Some("kvgate.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Server(args) => {
                assert_eq!(args.bind.as_deref(), Some("127.0.0.1:7000"));
                assert!(args.debug_log_commands);
                assert!(args.layer_name.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_default() {
        let cli = Cli::parse_from(["kvgate", "config", "default"]);
        assert!(matches!(cli.command, Commands::Config(_)));
    }

    #[test]
    fn test_parse_config_validate_uses_global_path() {
        let cli = Cli::parse_from(["kvgate", "config", "validate", "-c", "custom.toml"]);
        assert_eq!(cli.config.as_deref(), Some("custom.toml"));
        match cli.command {
            Commands::Config(args) => {
                assert!(matches!(args.command, commands::ConfigCommand::Validate))
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
