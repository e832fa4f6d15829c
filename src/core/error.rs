//! Error types and their wire mapping.
//!
//! Every failure a client can observe is a [`GatewayError`]. Errors are
//! connection-local: they produce an error reply and the connection keeps
//! serving. The message strings are part of the client contract.

use crate::gateway::protocol::RespError;
use crate::store::StoreError;
use thiserror::Error;

/// Gateway error conditions.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Command sent with the wrong number of arguments.
    #[error("wrong number of arguments for '{verb}' command")]
    WrongArity { verb: String },

    /// No handler is registered for the verb.
    #[error("unknown command '{verb}'")]
    UnknownCommand { verb: String },

    /// Malformed frame on the wire.
    #[error("Protocol error: {detail}")]
    Protocol { detail: String },

    /// Data or transaction command before a successful `chroot`.
    #[error("must chroot into a directory first")]
    NoNamespace,

    /// Data command, `commit` or `cancel` without an open transaction.
    #[error("no open transaction")]
    NoTransaction,

    /// `begin` while a transaction is already open.
    #[error("transaction already open")]
    TransactionAlreadyOpen,

    /// `chroot` while a transaction is open and rebinding is disabled.
    #[error("cannot chroot with an open transaction")]
    RebindWithOpenTransaction,

    /// Credential check failed.
    #[error("unauthorized")]
    Unauthorized,

    /// The store refused to create a transaction.
    #[error("cannot begin transaction")]
    CannotBegin {
        #[source]
        source: StoreError,
    },

    /// The tenant namespace could not be created or opened.
    #[error("cannot open subspace")]
    CannotOpenSubspace {
        #[source]
        source: StoreError,
    },

    /// Store operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),
}

/// Coarse classification of [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Arity, unknown verb, malformed frame.
    Protocol,
    /// Command issued in the wrong session state.
    SessionState,
    /// Credential mismatch.
    Unauthorized,
    /// Failure reported by the store.
    Store,
}

impl GatewayError {
    /// Create a wrong arity error.
    pub fn wrong_arity(verb: impl Into<String>) -> Self {
        Self::WrongArity { verb: verb.into() }
    }

    /// Create an unknown command error.
    pub fn unknown_command(verb: impl Into<String>) -> Self {
        Self::UnknownCommand { verb: verb.into() }
    }

    /// Create a protocol error.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WrongArity { .. } | Self::UnknownCommand { .. } | Self::Protocol { .. } => {
                ErrorKind::Protocol
            }
            Self::NoNamespace
            | Self::NoTransaction
            | Self::TransactionAlreadyOpen
            | Self::RebindWithOpenTransaction => ErrorKind::SessionState,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::CannotBegin { .. } | Self::CannotOpenSubspace { .. } | Self::Store(_) => {
                ErrorKind::Store
            }
        }
    }

    /// Underlying store error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::CannotBegin { source } | Self::CannotOpenSubspace { source } => Some(source),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }

    /// Error reply for the wire.
    pub fn to_resp(&self) -> RespError {
        RespError::generic(self.to_string())
    }
}

impl From<GatewayError> for RespError {
    fn from(error: GatewayError) -> Self {
        error.to_resp()
    }
}

/// Result type using GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_messages() {
        let cases = [
            (GatewayError::NoNamespace, "ERR must chroot into a directory first"),
            (GatewayError::NoTransaction, "ERR no open transaction"),
            (GatewayError::TransactionAlreadyOpen, "ERR transaction already open"),
            (GatewayError::Unauthorized, "ERR unauthorized"),
            (
                GatewayError::wrong_arity("get"),
                "ERR wrong number of arguments for 'get' command",
            ),
            (
                GatewayError::unknown_command("frobnicate"),
                "ERR unknown command 'frobnicate'",
            ),
            (
                GatewayError::CannotBegin {
                    source: StoreError::Unavailable {
                        message: "down".to_string(),
                    },
                },
                "ERR cannot begin transaction",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_resp().to_string(), expected);
        }
    }

    #[test]
    fn test_store_errors_surface_verbatim() {
        let error = GatewayError::from(StoreError::NotCommitted);
        assert_eq!(error.kind(), ErrorKind::Store);
        assert_eq!(error.store_error(), Some(&StoreError::NotCommitted));
        assert_eq!(
            error.to_resp().message,
            StoreError::NotCommitted.to_string()
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(GatewayError::protocol("bad").kind(), ErrorKind::Protocol);
        assert_eq!(GatewayError::NoTransaction.kind(), ErrorKind::SessionState);
        assert_eq!(
            GatewayError::RebindWithOpenTransaction.kind(),
            ErrorKind::SessionState
        );
        assert_eq!(GatewayError::Unauthorized.kind(), ErrorKind::Unauthorized);
    }
}
