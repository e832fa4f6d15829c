//! Multi-tenant RESP gateway.
//!
//! Clients speak RESP2 to the gateway. Each connection gets a [`Session`]
//! that must `chroot` into a tenant namespace before it can `begin` a
//! transaction and read or write keys:
//!
//! ```text
//! ┌────────┐  chroot ns user secret   ┌────────┐  begin   ┌────────────┐
//! │Unbound │ ───────────────────────▶ │ Bound  │ ───────▶ │ Bound+TxOp │
//! └────────┘                          └────────┘ ◀─────── └────────────┘
//!                                               commit/cancel
//! ```
//!
//! Keys sent by a client are packed under the tenant's directory prefix by
//! [`keys::RangeKeyCodec`], so tenants never see each other's data.

pub mod commands;
pub mod keys;
pub mod protocol;
pub mod service;
pub mod session;
pub mod tenancy;

pub use commands::{CommandHandler, CommandRouter, CommandState, Precondition};
pub use service::GatewayService;
pub use session::{Session, SessionState};
pub use tenancy::{TenantAuthorizer, DEFAULT_AUTHORIZATION_DIRECTORY};

/// Default layer tag for tenant directories.
pub const DEFAULT_LAYER_NAME: &str = "gateway";

/// Gateway behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Layer tag applied to tenant directories.
    pub layer_name: String,

    /// System directory holding credential records.
    pub authorization_directory: String,

    /// Let `chroot` replace the binding while a transaction is open.
    pub allow_rebind_with_open_transaction: bool,

    /// Log every data command with printable keys.
    pub debug_log_commands: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            layer_name: DEFAULT_LAYER_NAME.to_string(),
            authorization_directory: DEFAULT_AUTHORIZATION_DIRECTORY.to_string(),
            allow_rebind_with_open_transaction: false,
            debug_log_commands: false,
        }
    }
}
