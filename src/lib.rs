//! kvgate - multi-tenant RESP gateway for an ordered transactional key-value
//! store.
//!
//! Clients connect over TCP, authenticate into a tenant namespace with
//! `chroot`, and run explicit transactions (`begin`/`commit`/`cancel`) of
//! single-key and range operations. Each tenant's keys live under their own
//! directory prefix.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   RESP2 clients (redis-cli, …)                  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  net::tcp  →  gateway::service  (one task per connection)       │
//! │  gateway::protocol (codec) → gateway::commands (router)         │
//! │  gateway::session │ gateway::tenancy │ gateway::keys            │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  store: Database / Transaction traits                           │
//! │  tuple │ subspace │ directory │ memory (MVCC engine)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Component lifecycle
//! - [`core::error`] - Error taxonomy and wire mapping
//! - [`gateway`] - Sessions, commands, tenancy and the connection loop
//! - [`net`] - TCP listener
//! - [`store`] - Store seam, key encoding and the in-memory engine
//! - [`cli`] - CLI command implementations

// Core infrastructure
pub mod core;

// Gateway
pub mod gateway;

// Networking
pub mod net;

// Store seam and backend
pub mod store;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
