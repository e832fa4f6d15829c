//! Command handlers and dispatch.
//!
//! # Command Table
//!
//! | Verb          | Arity | Precondition          | Reply                         |
//! |---------------|-------|-----------------------|-------------------------------|
//! | `ping`        | 1     | none                  | `PONG`                        |
//! | `quit`        | 1     | none                  | `OK`, then close              |
//! | `chroot`      | 4     | rebind allowed        | `OK`                          |
//! | `begin`       | 1     | bound, no transaction | `[READ_VERSION, n]`           |
//! | `cancel`      | 1     | transaction open      | `[CANCEL]`                    |
//! | `commit`      | 1     | transaction open      | `[COMMIT, n]` / `[CANCEL, e]` |
//! | `get`         | 2     | transaction open      | bulk or null                  |
//! | `set`         | 3     | transaction open      | `OK`                          |
//! | `clear`       | 2     | transaction open      | `OK`                          |
//! | `get_range`   | 3     | transaction open      | `[[k, v], ...]`               |
//! | `clear_range` | 3     | transaction open      | `OK`                          |
//!
//! Preconditions are checked before arity, so a data command on an unbound
//! session reports the missing `chroot` whatever its arguments. Unknown verbs
//! are reported lower-cased; arity errors echo the verb as sent.

pub mod connection;
pub mod data;
pub mod transactions;

use super::protocol::{Command, RespValue};
use super::session::Session;
use super::tenancy::TenantAuthorizer;
use super::GatewaySettings;
use crate::core::error::GatewayError;
use crate::store::{Database, DirectoryLayer, StoreResult};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Result of command execution.
pub type CommandResult = Result<RespValue, GatewayError>;

/// Future returned by [`CommandHandler::execute`].
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = CommandResult> + Send + 'a>>;

/// Session state a handler requires before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Runs in any state.
    None,
    /// Runs unless a transaction is open and rebinding is disabled.
    Rebindable,
    /// Namespace bound and no transaction open.
    Idle,
    /// Namespace bound and a transaction open.
    Transaction,
}

/// Command handler trait.
///
/// Each verb implements this trait. Handlers own the session mutation for
/// their verb; the router only validates.
pub trait CommandHandler: Send + Sync {
    /// Execute the command.
    fn execute<'a>(
        &'a self,
        session: &'a mut Session,
        cmd: Command,
        state: Arc<CommandState>,
    ) -> CommandFuture<'a>;

    /// Lower-case verb.
    fn name(&self) -> &'static str;

    /// Exact number of elements, verb included.
    fn arity(&self) -> usize;

    /// Required session state.
    fn precondition(&self) -> Precondition {
        Precondition::None
    }
}

/// Shared state for command execution.
pub struct CommandState {
    db: Arc<dyn Database>,
    directories: DirectoryLayer,
    authorizer: TenantAuthorizer,
    settings: GatewaySettings,
}

impl CommandState {
    /// Create new command state.
    pub fn new(
        db: Arc<dyn Database>,
        directories: DirectoryLayer,
        authorizer: TenantAuthorizer,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            db,
            directories,
            authorizer,
            settings,
        }
    }

    /// Open the authorization directory named in `settings` and build the
    /// state around it.
    pub async fn open(db: Arc<dyn Database>, settings: GatewaySettings) -> StoreResult<Self> {
        let directories = DirectoryLayer::new();
        let authorizer = TenantAuthorizer::open(
            Arc::clone(&db),
            &directories,
            &settings.authorization_directory,
        )
        .await?;
        Ok(Self::new(db, directories, authorizer, settings))
    }

    /// Backing store.
    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Directory layer used for tenant namespaces.
    pub fn directories(&self) -> &DirectoryLayer {
        &self.directories
    }

    /// Credential checker.
    pub fn authorizer(&self) -> &TenantAuthorizer {
        &self.authorizer
    }

    /// Gateway settings.
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }
}

/// Handler registration failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// Handler reported an empty verb.
    #[error("command handler has an empty verb")]
    EmptyVerb,

    /// Verb already registered.
    #[error("command '{verb}' is already registered")]
    Duplicate { verb: String },
}

/// Routes commands to handlers by verb.
pub struct CommandRouter {
    /// Registered handlers, keyed by lower-case verb.
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Create a router with every gateway command registered.
    pub fn with_default_commands() -> Result<Self, RegistrationError> {
        let mut router = Self::new();

        // Connection commands
        router.register(Arc::new(connection::PingHandler))?;
        router.register(Arc::new(connection::QuitHandler))?;
        router.register(Arc::new(connection::ChrootHandler))?;

        // Transaction commands
        router.register(Arc::new(transactions::BeginHandler))?;
        router.register(Arc::new(transactions::CancelHandler))?;
        router.register(Arc::new(transactions::CommitHandler))?;

        // Data commands
        router.register(Arc::new(data::GetHandler))?;
        router.register(Arc::new(data::SetHandler))?;
        router.register(Arc::new(data::ClearHandler))?;
        router.register(Arc::new(data::GetRangeHandler))?;
        router.register(Arc::new(data::ClearRangeHandler))?;

        Ok(router)
    }

    /// Register a command handler.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) -> Result<(), RegistrationError> {
        let verb = handler.name().to_ascii_lowercase();
        if verb.is_empty() {
            return Err(RegistrationError::EmptyVerb);
        }
        if self.handlers.contains_key(&verb) {
            return Err(RegistrationError::Duplicate { verb });
        }
        self.handlers.insert(verb, handler);
        Ok(())
    }

    /// Get a handler for a verb, case-insensitively.
    pub fn get(&self, verb: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(&verb.to_ascii_lowercase())
    }

    /// Execute a command.
    pub async fn execute(
        &self,
        session: &mut Session,
        cmd: Command,
        state: Arc<CommandState>,
    ) -> CommandResult {
        let verb = cmd.normalized_verb();
        let handler = self
            .get(&verb)
            .ok_or_else(|| GatewayError::unknown_command(&verb))?;

        check_precondition(handler.precondition(), session, &state)?;

        // Arity errors echo the verb as the client sent it.
        if cmd.arity() != handler.arity() {
            return Err(GatewayError::wrong_arity(&cmd.verb));
        }

        handler.execute(session, cmd, state).await
    }

    /// Execute a command and render the outcome as a reply.
    pub async fn dispatch(
        &self,
        session: &mut Session,
        cmd: Command,
        state: Arc<CommandState>,
    ) -> RespValue {
        match self.execute(session, cmd, state).await {
            Ok(reply) => reply,
            Err(e) => RespValue::Error(e.to_resp()),
        }
    }

    /// All registered verbs, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut verbs: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        verbs.sort_unstable();
        verbs
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn check_precondition(
    precondition: Precondition,
    session: &Session,
    state: &CommandState,
) -> Result<(), GatewayError> {
    match precondition {
        Precondition::None => Ok(()),
        Precondition::Rebindable => {
            if session.has_transaction() && !state.settings().allow_rebind_with_open_transaction {
                return Err(GatewayError::RebindWithOpenTransaction);
            }
            Ok(())
        }
        Precondition::Idle => {
            if session.namespace().is_none() {
                return Err(GatewayError::NoNamespace);
            }
            if session.has_transaction() {
                return Err(GatewayError::TransactionAlreadyOpen);
            }
            Ok(())
        }
        Precondition::Transaction => {
            if session.namespace().is_none() {
                return Err(GatewayError::NoNamespace);
            }
            if !session.has_transaction() {
                return Err(GatewayError::NoTransaction);
            }
            Ok(())
        }
    }
}
