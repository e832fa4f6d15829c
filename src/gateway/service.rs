//! Gateway service.
//!
//! Accepts client connections and runs one command loop per connection.
//! Commands on a connection are handled strictly in arrival order; a reply
//! is written before the next command is decoded.

use super::commands::{CommandRouter, CommandState};
use super::protocol::{DecodeResult, RespCodec, RespValue};
use super::session::Session;
use crate::core::error::GatewayError;
use crate::net::{ListenerError, TcpConnection, TcpListener};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Gateway service.
pub struct GatewayService {
    /// Command router.
    router: CommandRouter,

    /// Shared command state.
    state: Arc<CommandState>,

    /// Connection acceptor.
    listener: TcpListener,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayService {
    /// Create a new gateway service.
    pub fn new(
        router: CommandRouter,
        state: Arc<CommandState>,
        listener: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            router,
            state,
            listener,
            shutdown_rx,
        }
    }

    /// Shared command state.
    pub fn state(&self) -> &Arc<CommandState> {
        &self.state
    }

    /// Connection acceptor.
    pub fn listener(&self) -> &TcpListener {
        &self.listener
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TokioTcpListener, ListenerError> {
        let listener = self.listener.bind().await?;
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "gateway listening");
        }
        Ok(listener)
    }

    /// Bind and serve until shutdown is signalled.
    pub async fn run(self: Arc<Self>) -> Result<(), ListenerError> {
        let listener = self.bind().await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Accept connections on an already bound listener until shutdown.
    pub async fn serve(self: Arc<Self>, listener: TokioTcpListener) {
        loop {
            match self.listener.accept(&listener).await {
                Ok(Some(conn)) => {
                    debug!(conn = %conn.id, remote = %conn.remote_addr, "connection accepted");
                    let service = Arc::clone(&self);
                    tokio::spawn(async move {
                        service.handle_connection(conn).await;
                    });
                }
                Ok(None) => break,
                Err(ListenerError::AtCapacity { remote_addr }) => {
                    warn!(remote = %remote_addr, "connection limit reached, connection dropped");
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                }
            }
        }

        self.listener.shutdown();
        self.listener.stopped();
        info!("gateway stopped accepting connections");
    }

    /// Handle a single connection.
    ///
    /// Processes commands until the peer disconnects, sends `quit`, or
    /// shutdown is signalled. Any transaction still open at that point is
    /// abandoned.
    pub async fn handle_connection(self: Arc<Self>, conn: TcpConnection) {
        let mut session = Session::new(conn.id, Some(conn.remote_addr));
        let mut stream = conn.into_stream();
        let mut codec = RespCodec::new();
        let mut buffer = BytesMut::with_capacity(self.listener.config().read_buffer_size);
        let mut shutdown_rx = self.shutdown_rx.clone();

        'conn: loop {
            tokio::select! {
                result = stream.read_buf(&mut buffer) => {
                    match result {
                        Ok(0) => break,
                        Ok(_) => {
                            loop {
                                let response = match codec.decode(&mut buffer) {
                                    DecodeResult::Complete(cmd) => {
                                        let reply = self
                                            .router
                                            .dispatch(&mut session, cmd, Arc::clone(&self.state))
                                            .await;
                                        self.listener
                                            .metrics()
                                            .command_processed(matches!(reply, RespValue::Error(_)));
                                        reply
                                    }
                                    DecodeResult::Incomplete => break,
                                    DecodeResult::Invalid(detail) => {
                                        warn!(conn = %session.id(), detail = %detail, "protocol error");
                                        buffer.clear();
                                        RespValue::Error(GatewayError::Protocol { detail }.to_resp())
                                    }
                                };

                                let encoded = codec.encode(&response);
                                if let Err(e) = stream.write_all(&encoded).await {
                                    debug!(conn = %session.id(), error = %e, "write failed");
                                    break 'conn;
                                }

                                if session.is_closing() {
                                    break 'conn;
                                }
                            }
                        }
                        Err(e) => {
                            debug!(conn = %session.id(), error = %e, "read failed");
                            break;
                        }
                    }
                }

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        session.abandon();
        self.listener.connection_closed();
        debug!(conn = %session.id(), "connection closed");
    }
}
