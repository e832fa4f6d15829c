//! kvgate - unified CLI entrypoint.
//!
//! Usage:
//!   kvgate server --config config/kvgate.toml
//!   kvgate config validate --config config/kvgate.toml
//!   kvgate config default

use anyhow::Result;
use clap::Parser;
use kvgate::cli::commands::{run_config, run_server};
use kvgate::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.map(PathBuf::from);

    match cli.command {
        Commands::Server(args) => run_server(args, config_path.as_deref(), cli.log_level).await,
        Commands::Config(args) => run_config(args, config_path.as_deref()),
    }
}
