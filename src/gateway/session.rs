//! Per-connection session state.
//!
//! ```text
//!   Unbound ──chroot──▶ Bound ──begin──▶ TxOpen
//!                         ▲                │
//!                         └─commit/cancel──┘
//! ```
//!
//! A session owns at most one transaction handle. Dropping the session
//! abandons the handle without committing.

use crate::net::ConnectionId;
use crate::store::{DirectorySubspace, Transaction};
use std::net::SocketAddr;
use tracing::debug;

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No namespace bound.
    Unbound,
    /// Namespace bound, no transaction.
    Bound,
    /// Namespace bound and a transaction open.
    TxOpen,
}

/// State of one client connection.
pub struct Session {
    id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    namespace: Option<DirectorySubspace>,
    transaction: Option<Box<dyn Transaction>>,
    closing: bool,
}

impl Session {
    /// Create a session for a freshly accepted connection.
    pub fn new(id: ConnectionId, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            remote_addr,
            namespace: None,
            transaction: None,
            closing: false,
        }
    }

    /// Connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer address, when known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        match (&self.namespace, &self.transaction) {
            (None, _) => SessionState::Unbound,
            (Some(_), None) => SessionState::Bound,
            (Some(_), Some(_)) => SessionState::TxOpen,
        }
    }

    /// Bound namespace.
    pub fn namespace(&self) -> Option<&DirectorySubspace> {
        self.namespace.as_ref()
    }

    /// Bind (or rebind) a namespace. The open transaction, if any, is kept.
    pub fn bind(&mut self, namespace: DirectorySubspace) {
        debug!(conn = %self.id, namespace = %namespace.display_path(), "namespace bound");
        self.namespace = Some(namespace);
    }

    /// Whether a transaction is open.
    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Install a freshly created transaction.
    pub fn open_transaction(&mut self, transaction: Box<dyn Transaction>) {
        debug!(conn = %self.id, "transaction opened");
        self.transaction = Some(transaction);
    }

    /// Open transaction.
    pub fn transaction_mut(&mut self) -> Option<&mut (dyn Transaction + 'static)> {
        self.transaction.as_deref_mut()
    }

    /// Remove the open transaction, leaving the session `Bound`.
    pub fn take_transaction(&mut self) -> Option<Box<dyn Transaction>> {
        self.transaction.take()
    }

    /// Namespace and transaction together, for data commands.
    pub fn scoped(&mut self) -> Option<(&DirectorySubspace, &mut (dyn Transaction + 'static))> {
        match (&self.namespace, &mut self.transaction) {
            (Some(namespace), Some(transaction)) => Some((namespace, transaction.as_mut())),
            _ => None,
        }
    }

    /// Ask the connection loop to close after the current reply.
    pub fn mark_closing(&mut self) {
        self.closing = true;
    }

    /// Whether the connection should close.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Abandon any open transaction without committing.
    pub fn abandon(&mut self) {
        if let Some(mut transaction) = self.transaction.take() {
            transaction.cancel();
            debug!(conn = %self.id, "open transaction abandoned");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("namespace", &self.namespace.as_ref().map(|n| n.display_path()))
            .field("state", &self.state())
            .field("closing", &self.closing)
            .finish()
    }
}
