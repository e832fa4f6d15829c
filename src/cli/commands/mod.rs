//! CLI command implementations.

mod config;
mod server;

pub use config::{run_config, ConfigArgs, ConfigCommand, DEFAULT_CONFIG_PATH};
pub use server::{load_config, run_server, ServerArgs};
