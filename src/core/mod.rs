//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Component lifecycle
//! - [`error`] - Gateway error taxonomy and wire mapping

pub mod config;
pub mod error;
pub mod runtime;
