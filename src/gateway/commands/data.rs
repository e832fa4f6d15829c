//! Data command handlers.
//!
//! Implements GET, SET, CLEAR, GET_RANGE and CLEAR_RANGE. Every key is
//! scoped to the session's namespace through [`RangeKeyCodec`] and every
//! operation runs in the session's open transaction.

use super::{CommandFuture, CommandHandler, CommandState, Precondition};
use crate::core::error::GatewayError;
use crate::gateway::keys::{printable, RangeKeyCodec};
use crate::gateway::protocol::{Command, RespValue};
use crate::gateway::session::Session;
use crate::store::{DirectorySubspace, Transaction};
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// Namespace and transaction of a session that passed the
/// [`Precondition::Transaction`] check.
fn scoped(
    session: &mut Session,
) -> Result<(&DirectorySubspace, &mut (dyn Transaction + 'static)), GatewayError> {
    if session.namespace().is_none() {
        return Err(GatewayError::NoNamespace);
    }
    session.scoped().ok_or(GatewayError::NoTransaction)
}

fn arg(cmd: &Command, index: usize) -> Result<&Bytes, GatewayError> {
    cmd.arg(index)
        .ok_or_else(|| GatewayError::wrong_arity(&cmd.verb))
}

fn trace_op(state: &CommandState, session: &Session, op: &str, keys: &[&[u8]]) {
    if state.settings().debug_log_commands {
        let keys: Vec<String> = keys.iter().map(|k| printable(k)).collect();
        debug!(conn = %session.id(), op, keys = ?keys, "data command");
    }
}

/// GET command handler.
pub struct GetHandler;

impl CommandHandler for GetHandler {
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        cmd: Command,
        state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let key = arg(&cmd, 0)?;
            trace_op(&state, session, "get", &[&key[..]]);

            let (namespace, transaction) = scoped(session)?;
            let store_key = RangeKeyCodec::new(namespace.subspace()).pack_key(key);

            match transaction.get(&store_key).await? {
                Some(value) => Ok(RespValue::BulkString(value)),
                None => Ok(RespValue::Null),
            }
        })
    }

    fn name(&self) -> &'static str {
        "get"
    }

    fn arity(&self) -> usize {
        2
    }

    fn precondition(&self) -> Precondition {
        Precondition::Transaction
    }
}

/// SET command handler.
pub struct SetHandler;

impl CommandHandler for SetHandler {
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        cmd: Command,
        state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let key = arg(&cmd, 0)?;
            let value = arg(&cmd, 1)?;
            trace_op(&state, session, "set", &[&key[..]]);

            let (namespace, transaction) = scoped(session)?;
            let store_key = RangeKeyCodec::new(namespace.subspace()).pack_key(key);
            transaction.set(&store_key, value);

            Ok(RespValue::ok())
        })
    }

    fn name(&self) -> &'static str {
        "set"
    }

    fn arity(&self) -> usize {
        3
    }

    fn precondition(&self) -> Precondition {
        Precondition::Transaction
    }
}

/// CLEAR command handler.
pub struct ClearHandler;

impl CommandHandler for ClearHandler {
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        cmd: Command,
        state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let key = arg(&cmd, 0)?;
            trace_op(&state, session, "clear", &[&key[..]]);

            let (namespace, transaction) = scoped(session)?;
            let store_key = RangeKeyCodec::new(namespace.subspace()).pack_key(key);
            transaction.clear(&store_key);

            Ok(RespValue::ok())
        })
    }

    fn name(&self) -> &'static str {
        "clear"
    }

    fn arity(&self) -> usize {
        2
    }

    fn precondition(&self) -> Precondition {
        Precondition::Transaction
    }
}

/// GET_RANGE command handler.
///
/// Replies with `[[key, value], ...]` in key order. A failure while reading
/// the range fails the whole command; no partial array is produced.
pub struct GetRangeHandler;

impl CommandHandler for GetRangeHandler {
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        cmd: Command,
        state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let begin = arg(&cmd, 0)?;
            let end = arg(&cmd, 1)?;
            trace_op(&state, session, "get_range", &[&begin[..], &end[..]]);

            let (namespace, transaction) = scoped(session)?;
            let codec = RangeKeyCodec::new(namespace.subspace());

            let rows = transaction
                .get_range(codec.pack_range(begin, end))
                .collect::<Result<Vec<_>, _>>()?;

            let mut items = Vec::with_capacity(rows.len());
            for row in rows {
                let key = codec.decode_key(&row.key)?;
                items.push(RespValue::array(vec![
                    RespValue::bulk(key),
                    RespValue::BulkString(row.value),
                ]));
            }

            Ok(RespValue::array(items))
        })
    }

    fn name(&self) -> &'static str {
        "get_range"
    }

    fn arity(&self) -> usize {
        3
    }

    fn precondition(&self) -> Precondition {
        Precondition::Transaction
    }
}

/// CLEAR_RANGE command handler.
pub struct ClearRangeHandler;

impl CommandHandler for ClearRangeHandler {
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        cmd: Command,
        state: Arc<CommandState>,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let begin = arg(&cmd, 0)?;
            let end = arg(&cmd, 1)?;
            trace_op(&state, session, "clear_range", &[&begin[..], &end[..]]);

            let (namespace, transaction) = scoped(session)?;
            let range = RangeKeyCodec::new(namespace.subspace()).pack_range(begin, end);
            transaction.clear_range(range);

            Ok(RespValue::ok())
        })
    }

    fn name(&self) -> &'static str {
        "clear_range"
    }

    fn arity(&self) -> usize {
        3
    }

    fn precondition(&self) -> Precondition {
        Precondition::Transaction
    }
}
