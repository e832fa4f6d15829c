//! Transaction lifecycle handlers.
//!
//! Implements BEGIN, CANCEL and COMMIT. A session holds at most one
//! transaction; `commit` and `cancel` release it whatever the outcome.

use super::{CommandFuture, CommandHandler, CommandState, Precondition};
use crate::core::error::GatewayError;
use crate::gateway::protocol::{Command, RespValue};
use crate::gateway::session::Session;
use std::sync::Arc;
use tracing::debug;

/// Reply tag for `begin`.
pub const READ_VERSION: &str = "READ_VERSION";
/// Reply tag for `cancel` and failed commits.
pub const CANCEL: &str = "CANCEL";
/// Reply tag for successful commits.
pub const COMMIT: &str = "COMMIT";

/// BEGIN command handler.
pub struct BeginHandler;

impl CommandHandler for BeginHandler {
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        _cmd: Command,
        state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let mut transaction = state
                .db()
                .create_transaction()
                .map_err(|source| GatewayError::CannotBegin { source })?;
            let read_version = transaction.read_version().await?;

            session.open_transaction(transaction);
            Ok(RespValue::array(vec![
                RespValue::simple_string(READ_VERSION),
                RespValue::integer(read_version),
            ]))
        })
    }

    fn name(&self) -> &'static str {
        "begin"
    }

    fn arity(&self) -> usize {
        1
    }

    fn precondition(&self) -> Precondition {
        Precondition::Idle
    }
}

/// CANCEL command handler.
pub struct CancelHandler;

impl CommandHandler for CancelHandler {
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        _cmd: Command,
        _state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let mut transaction = session.take_transaction().ok_or(GatewayError::NoTransaction)?;
            transaction.cancel();
            debug!(conn = %session.id(), "transaction cancelled");

            Ok(RespValue::array(vec![RespValue::simple_string(CANCEL)]))
        })
    }

    fn name(&self) -> &'static str {
        "cancel"
    }

    fn arity(&self) -> usize {
        1
    }

    fn precondition(&self) -> Precondition {
        Precondition::Transaction
    }
}

/// COMMIT command handler.
///
/// Conflicts are reported as `[CANCEL, error]` and never retried.
pub struct CommitHandler;

impl CommandHandler for CommitHandler {
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        _cmd: Command,
        _state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let mut transaction = session.take_transaction().ok_or(GatewayError::NoTransaction)?;

            if let Err(e) = transaction.commit().await {
                debug!(conn = %session.id(), error = %e, "commit failed");
                return Ok(RespValue::array(vec![
                    RespValue::simple_string(CANCEL),
                    RespValue::Error(GatewayError::from(e).to_resp()),
                ]));
            }

            let version = transaction.committed_version()?;
            debug!(conn = %session.id(), version, "transaction committed");
            Ok(RespValue::array(vec![
                RespValue::simple_string(COMMIT),
                RespValue::integer(version),
            ]))
        })
    }

    fn name(&self) -> &'static str {
        "commit"
    }

    fn arity(&self) -> usize {
        1
    }

    fn precondition(&self) -> Precondition {
        Precondition::Transaction
    }
}
