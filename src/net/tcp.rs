//! TCP listener.
//!
//! Binds the gateway port, assigns every accepted connection a
//! process-unique [`ConnectionId`] and enforces the connection limit.

use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::watch;

/// Listener failures.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The bind address could not be bound.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `accept(2)` failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// A connection arrived while at the connection limit and was dropped.
    #[error("connection limit reached, rejected {remote_addr}")]
    AtCapacity { remote_addr: SocketAddr },
}

/// TCP listener configuration.
#[derive(Debug, Clone)]
pub struct TcpListenerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Read buffer size.
    pub read_buffer_size: usize,

    /// TCP nodelay (disable Nagle's algorithm).
    pub nodelay: bool,
}

impl Default for TcpListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 6380)),
            max_connections: 10_000,
            read_buffer_size: 4 * 1024,
            nodelay: true,
        }
    }
}

/// TCP listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpListenerState {
    /// Not yet started.
    Created,
    /// Binding to address.
    Binding,
    /// Accepting connections.
    Listening,
    /// Shutting down.
    ShuttingDown,
    /// Stopped.
    Stopped,
}

/// Connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepted TCP connection with metadata.
pub struct TcpConnection {
    /// Connection ID.
    pub id: ConnectionId,

    /// Remote address.
    pub remote_addr: SocketAddr,

    stream: TcpStream,
}

impl TcpConnection {
    /// Create a new TCP connection.
    pub fn new(id: ConnectionId, stream: TcpStream, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            stream,
        }
    }

    /// Take the underlying stream.
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

/// TCP listener metrics.
#[derive(Debug, Default)]
pub struct TcpListenerMetrics {
    /// Total connections accepted.
    pub connections_total: AtomicU64,

    /// Currently active connections.
    pub connections_active: AtomicU64,

    /// Connections rejected (at capacity).
    pub connections_rejected: AtomicU64,

    /// Total commands processed.
    pub commands_total: AtomicU64,

    /// Commands answered with an error.
    pub commands_failed: AtomicU64,
}

impl TcpListenerMetrics {
    /// Record a new connection.
    pub fn connection_accepted(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a rejected connection.
    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a processed command.
    pub fn command_processed(&self, failed: bool) {
        self.commands_total.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get active connection count.
    pub fn active_connections(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }
}

/// TCP listener for accepting connections.
pub struct TcpListener {
    /// Configuration.
    config: TcpListenerConfig,

    /// Current state.
    state: RwLock<TcpListenerState>,

    /// Next connection ID.
    next_conn_id: AtomicU64,

    /// Shutdown flag.
    shutting_down: AtomicBool,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Metrics.
    metrics: Arc<TcpListenerMetrics>,
}

impl TcpListener {
    /// Create a new TCP listener.
    pub fn new(config: TcpListenerConfig, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            config,
            state: RwLock::new(TcpListenerState::Created),
            next_conn_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            shutdown_rx,
            metrics: Arc::new(TcpListenerMetrics::default()),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &TcpListenerConfig {
        &self.config
    }

    /// Get the current state.
    pub fn state(&self) -> TcpListenerState {
        *self.state.read()
    }

    /// Get metrics.
    pub fn metrics(&self) -> &Arc<TcpListenerMetrics> {
        &self.metrics
    }

    /// Check if at connection capacity.
    pub fn at_capacity(&self) -> bool {
        self.metrics.active_connections() >= self.config.max_connections as u64
    }

    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_conn_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Bind and start listening.
    pub async fn bind(&self) -> Result<TokioTcpListener, ListenerError> {
        *self.state.write() = TcpListenerState::Binding;

        let listener = TokioTcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: self.config.bind_addr,
                source,
            })?;

        *self.state.write() = TcpListenerState::Listening;

        Ok(listener)
    }

    /// Accept the next connection.
    ///
    /// Returns `Ok(None)` once shutdown has been signalled. Connections
    /// beyond the limit are closed immediately and reported as
    /// [`ListenerError::AtCapacity`].
    pub async fn accept(
        &self,
        listener: &TokioTcpListener,
    ) -> Result<Option<TcpConnection>, ListenerError> {
        if self.shutting_down.load(Ordering::Relaxed) {
            return Ok(None);
        }

        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return Ok(None);
        }

        tokio::select! {
            result = listener.accept() => {
                let (stream, addr) = result.map_err(ListenerError::Accept)?;

                if self.at_capacity() {
                    self.metrics.connection_rejected();
                    drop(stream);
                    return Err(ListenerError::AtCapacity { remote_addr: addr });
                }

                if self.config.nodelay {
                    let _ = stream.set_nodelay(true);
                }

                let id = self.next_connection_id();
                self.metrics.connection_accepted();

                Ok(Some(TcpConnection::new(id, stream, addr)))
            }
            _ = shutdown_rx.changed() => {
                Ok(None)
            }
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        *self.state.write() = TcpListenerState::ShuttingDown;
    }

    /// Mark as stopped.
    pub fn stopped(&self) {
        *self.state.write() = TcpListenerState::Stopped;
    }

    /// Record connection closed.
    pub fn connection_closed(&self) {
        self.metrics.connection_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_listener_config_default() {
        let config = TcpListenerConfig::default();
        assert_eq!(config.bind_addr.port(), 6380);
        assert_eq!(config.max_connections, 10_000);
        assert!(config.nodelay);
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(42).to_string(), "conn-42");
    }

    #[test]
    fn test_tcp_listener_metrics() {
        let metrics = TcpListenerMetrics::default();

        metrics.connection_accepted();
        metrics.connection_accepted();
        assert_eq!(metrics.active_connections(), 2);

        metrics.connection_closed();
        assert_eq!(metrics.active_connections(), 1);
        assert_eq!(metrics.connections_total.load(Ordering::Relaxed), 2);

        metrics.command_processed(false);
        metrics.command_processed(true);
        assert_eq!(metrics.commands_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.commands_failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_accept_assigns_increasing_ids() {
        let (_tx, rx) = watch::channel(false);
        let listener = TcpListener::new(
            TcpListenerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                ..Default::default()
            },
            rx,
        );

        let socket = listener.bind().await.unwrap();
        assert_eq!(listener.state(), TcpListenerState::Listening);
        let addr = socket.local_addr().unwrap();

        let _c1 = TcpStream::connect(addr).await.unwrap();
        let first = listener.accept(&socket).await.unwrap().unwrap();
        let _c2 = TcpStream::connect(addr).await.unwrap();
        let second = listener.accept(&socket).await.unwrap().unwrap();

        assert!(first.id < second.id);
        assert_eq!(listener.metrics().active_connections(), 2);
    }

    #[tokio::test]
    async fn test_accept_rejects_at_capacity() {
        let (_tx, rx) = watch::channel(false);
        let listener = TcpListener::new(
            TcpListenerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                max_connections: 1,
                ..Default::default()
            },
            rx,
        );
        let socket = listener.bind().await.unwrap();
        let addr = socket.local_addr().unwrap();

        let _c1 = TcpStream::connect(addr).await.unwrap();
        let _kept = listener.accept(&socket).await.unwrap().unwrap();

        let _c2 = TcpStream::connect(addr).await.unwrap();
        let err = listener.accept(&socket).await.err().unwrap();
        assert!(matches!(err, ListenerError::AtCapacity { .. }));
        assert_eq!(
            listener.metrics().connections_rejected.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_accept_returns_none_after_shutdown_signal() {
        let (tx, rx) = watch::channel(false);
        let listener = TcpListener::new(
            TcpListenerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                ..Default::default()
            },
            rx,
        );
        let socket = listener.bind().await.unwrap();

        tx.send(true).unwrap();
        assert!(listener.accept(&socket).await.unwrap().is_none());

        listener.shutdown();
        assert_eq!(listener.state(), TcpListenerState::ShuttingDown);
        listener.stopped();
        assert_eq!(listener.state(), TcpListenerState::Stopped);
    }
}
