//! Networking.

pub mod tcp;

pub use tcp::{
    ConnectionId, ListenerError, TcpConnection, TcpListener, TcpListenerConfig, TcpListenerMetrics,
};
