//! Server command implementation.

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

/// Start the gateway.
#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Bind address, overriding `server.bind`.
    #[arg(long)]
    pub bind: Option<String>,

    /// Tenant directory layer tag, overriding `gateway.layer_name`.
    #[arg(long)]
    pub layer_name: Option<String>,

    /// Log every data command at debug level.
    #[arg(long)]
    pub debug_log_commands: bool,
}

impl ServerArgs {
    fn overrides(&self, log_level: Option<String>) -> ConfigOverrides {
        ConfigOverrides {
            log_level,
            bind: self.bind.clone(),
            layer_name: self.layer_name.clone(),
            debug_log_commands: self.debug_log_commands,
        }
    }
}

/// Initialize tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` wins over the configured level.
#[cfg(feature = "telemetry")]
fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(_level: &str) {}

/// Load the configuration file, or defaults when no path is given, and
/// apply overrides.
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None => Config::default(),
    };
    config.apply_overrides(overrides);
    config.validate().context("invalid configuration after overrides")?;
    Ok(config)
}

/// Run the server command.
pub async fn run_server(
    args: ServerArgs,
    config_path: Option<&Path>,
    log_level: Option<String>,
) -> Result<()> {
    let config = load_config(config_path, &args.overrides(log_level))?;
    init_tracing(&config.telemetry.log_level);

    tracing::info!(
        config = ?config_path,
        bind = %config.server.bind,
        layer = %config.gateway.layer_name,
        tenants = config.tenants.len(),
        "configuration loaded"
    );

    let mut runtime = Runtime::new(config)?;
    runtime.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults_with_overrides() {
        let args = ServerArgs {
            bind: Some("127.0.0.1:7001".to_string()),
            layer_name: None,
            debug_log_commands: true,
        };
        let config = load_config(None, &args.overrides(Some("warn".to_string()))).unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:7001");
        assert_eq!(config.telemetry.log_level, "warn");
        assert!(config.telemetry.debug_log_commands);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = ServerArgs {
            bind: Some("nowhere".to_string()),
            ..Default::default()
        };
        assert!(load_config(None, &args.overrides(None)).is_err());
    }
}
