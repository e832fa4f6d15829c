//! Connection command handlers.
//!
//! Implements PING, QUIT and CHROOT.

use super::{CommandFuture, CommandHandler, CommandState, Precondition};
use crate::core::error::GatewayError;
use crate::gateway::protocol::{Command, RespValue};
use crate::gateway::session::Session;
use std::sync::Arc;
use tracing::{debug, warn};

/// PING command handler.
pub struct PingHandler;

impl CommandHandler for PingHandler {
    fn execute<'a>(
        &'a self,
        _session: &'a mut Session,
        _cmd: Command,
        _state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move { Ok(RespValue::pong()) })
    }

    fn name(&self) -> &'static str {
        "ping"
    }

    fn arity(&self) -> usize {
        1
    }
}

/// QUIT command handler.
pub struct QuitHandler;

impl CommandHandler for QuitHandler {
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        _cmd: Command,
        _state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            // The connection loop closes after writing the reply.
            session.mark_closing();
            Ok(RespValue::ok())
        })
    }

    fn name(&self) -> &'static str {
        "quit"
    }

    fn arity(&self) -> usize {
        1
    }
}

/// CHROOT command handler.
///
/// `chroot <namespace> <username> <secret>` authorizes the triple and binds
/// the tenant's directory to the session, creating it on first use.
pub struct ChrootHandler;

impl CommandHandler for ChrootHandler {
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        cmd: Command,
        state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let (namespace, username, secret) = match cmd.args.as_slice() {
                [namespace, username, secret] => (namespace, username, secret),
                _ => return Err(GatewayError::wrong_arity(&cmd.verb)),
            };

            let authorized = state
                .authorizer()
                .authorize(namespace, username, secret)
                .await?;
            if !authorized {
                warn!(
                    conn = %session.id(),
                    namespace = %String::from_utf8_lossy(namespace),
                    "chroot denied"
                );
                return Err(GatewayError::Unauthorized);
            }

            let layer = state.settings().layer_name.as_bytes();
            let directory = state
                .directories()
                .create_or_open(state.db().as_ref(), &[&namespace[..]], layer)
                .await
                .map_err(|source| GatewayError::CannotOpenSubspace { source })?;

            debug!(conn = %session.id(), namespace = %directory.display_path(), "chroot accepted");
            session.bind(directory);
            Ok(RespValue::ok())
        })
    }

    fn name(&self) -> &'static str {
        "chroot"
    }

    fn arity(&self) -> usize {
        4
    }

    fn precondition(&self) -> Precondition {
        Precondition::Rebindable
    }
}
