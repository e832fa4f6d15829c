//! Configuration parsing and validation.
//!
//! Gateway configuration is loaded from TOML files with CLI overrides.
//! Every field has a default, so an empty file is a valid configuration.

use crate::gateway::{GatewaySettings, DEFAULT_AUTHORIZATION_DIRECTORY, DEFAULT_LAYER_NAME};
use crate::net::TcpListenerConfig;
use crate::store::memory::DEFAULT_MAX_HISTORY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network listener configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Command behaviour.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// In-process store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Credential records provisioned at startup.
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

/// Network listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:6380").
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Disable Nagle's algorithm on accepted sockets.
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// Initial per-connection read buffer size in bytes.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_connections: default_max_connections(),
            nodelay: default_nodelay(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

/// Command behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Layer tag for tenant directories.
    #[serde(default = "default_layer_name")]
    pub layer_name: String,

    /// System directory holding credential records.
    #[serde(default = "default_authorization_directory")]
    pub authorization_directory: String,

    /// Let `chroot` rebind while a transaction is open.
    #[serde(default)]
    pub allow_rebind_with_open_transaction: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            layer_name: default_layer_name(),
            authorization_directory: default_authorization_directory(),
            allow_rebind_with_open_transaction: false,
        }
    }
}

/// In-process store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Number of commits retained for conflict detection.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log every data command with printable keys at debug level.
    #[serde(default)]
    pub debug_log_commands: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            debug_log_commands: false,
        }
    }
}

/// Credential record provisioned at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub namespace: String,
    pub username: String,
    pub secret: String,
}

// Default value functions

fn default_bind() -> String {
    "0.0.0.0:6380".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_nodelay() -> bool {
    true
}

fn default_read_buffer_size() -> usize {
    4 * 1024
}

fn default_layer_name() -> String {
    DEFAULT_LAYER_NAME.to_string()
}

fn default_authorization_directory() -> String {
    DEFAULT_AUTHORIZATION_DIRECTORY.to_string()
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

fn default_log_level() -> String {
    "info".to_string()
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref bind) = overrides.bind {
            self.server.bind = bind.clone();
        }
        if let Some(ref layer_name) = overrides.layer_name {
            self.gateway.layer_name = layer_name.clone();
        }
        if overrides.debug_log_commands {
            self.telemetry.debug_log_commands = true;
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_server()?;
        self.validate_gateway()?;
        self.validate_store()?;
        self.validate_telemetry()?;
        self.validate_tenants()?;
        Ok(())
    }

    /// Parsed bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("server.bind is not a socket address: {}", self.server.bind))
    }

    /// Listener settings derived from `[server]`.
    pub fn listener_config(&self) -> Result<TcpListenerConfig> {
        Ok(TcpListenerConfig {
            bind_addr: self.bind_addr()?,
            max_connections: self.server.max_connections,
            read_buffer_size: self.server.read_buffer_size,
            nodelay: self.server.nodelay,
        })
    }

    /// Command settings derived from `[gateway]` and `[telemetry]`.
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            layer_name: self.gateway.layer_name.clone(),
            authorization_directory: self.gateway.authorization_directory.clone(),
            allow_rebind_with_open_transaction: self.gateway.allow_rebind_with_open_transaction,
            debug_log_commands: self.telemetry.debug_log_commands,
        }
    }

    fn validate_server(&self) -> Result<()> {
        self.bind_addr()?;

        if self.server.max_connections == 0 {
            anyhow::bail!("server.max_connections must be > 0");
        }
        if self.server.read_buffer_size == 0 {
            anyhow::bail!("server.read_buffer_size must be > 0");
        }

        Ok(())
    }

    fn validate_gateway(&self) -> Result<()> {
        if self.gateway.layer_name.is_empty() {
            anyhow::bail!("gateway.layer_name must not be empty");
        }
        if self.gateway.authorization_directory.is_empty() {
            anyhow::bail!("gateway.authorization_directory must not be empty");
        }
        Ok(())
    }

    fn validate_store(&self) -> Result<()> {
        if self.store.max_history == 0 {
            anyhow::bail!("store.max_history must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                VALID_LOG_LEVELS,
                self.telemetry.log_level
            );
        }
        Ok(())
    }

    fn validate_tenants(&self) -> Result<()> {
        for (index, tenant) in self.tenants.iter().enumerate() {
            if tenant.namespace.is_empty() {
                anyhow::bail!("tenants[{}].namespace must not be empty", index);
            }
            if tenant.username.is_empty() {
                anyhow::bail!("tenants[{}].username must not be empty", index);
            }
            if tenant.secret.is_empty() {
                anyhow::bail!("tenants[{}].secret must not be empty", index);
            }
            if tenant.namespace == self.gateway.authorization_directory {
                anyhow::bail!(
                    "tenants[{}].namespace collides with the authorization directory",
                    index
                );
            }
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override bind address.
    pub bind: Option<String>,
    /// Override tenant directory layer tag.
    pub layer_name: Option<String>,
    /// Force per-command debug logging on.
    pub debug_log_commands: bool,
}
