//! Config command implementation.

use crate::core::config::Config;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
///
/// `validate` and `show` read the file named by the global `--config`.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Parse and validate a configuration file.
    Validate,
    /// Print a configuration file with defaults filled in.
    Show,
    /// Print the default configuration.
    Default,
}

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/kvgate.toml";

/// Run the config command.
pub fn run_config(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

    match args.command {
        ConfigCommand::Validate => {
            let summary = validate_config(path)?;
            println!("{}", summary);
            Ok(())
        }
        ConfigCommand::Show => {
            print!("{}", Config::from_file(path)?.to_toml()?);
            Ok(())
        }
        ConfigCommand::Default => {
            print!("{}", Config::default().to_toml()?);
            Ok(())
        }
    }
}

fn validate_config(path: &Path) -> Result<String> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }

    let config = Config::from_file(path)?;
    Ok(format!(
        "✓ {} is valid (bind {}, {} tenant(s))",
        path.display(),
        config.server.bind,
        config.tenants.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nbind = \"127.0.0.1:6380\"\n\n[[tenants]]\nnamespace = \"t\"\nusername = \"u\"\nsecret = \"p\""
        )
        .unwrap();

        let summary = validate_config(file.path()).unwrap();
        assert!(summary.contains("1 tenant(s)"));
    }

    #[test]
    fn test_validate_missing_file() {
        let err = validate_config(Path::new("/nonexistent/kvgate.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
