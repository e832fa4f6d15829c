//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use bytes::Bytes;
use kvgate::gateway::protocol::{Command, RespValue};
use kvgate::gateway::{CommandRouter, CommandState, GatewaySettings, Session};
use kvgate::net::ConnectionId;
use kvgate::store::{
    Database, KeyRange, MemoryDatabase, RangeIter, StoreError, StoreFuture, StoreResult,
    Transaction,
};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Tenants provisioned by [`Harness::new`].
pub const TENANTS: [(&str, &str, &str); 2] =
    [("tenantA", "alice", "s3cr3t"), ("tenantB", "bob", "hunter2")];

/// Write `content` to a temporary config file.
pub fn create_config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    create_config_file(
        r#"
[server]
bind = "127.0.0.1:0"

[telemetry]
log_level = "warn"
"#,
    )
}

/// Router, command state and store wired together without a listener.
pub struct Harness {
    pub db: Arc<dyn Database>,
    pub router: CommandRouter,
    pub state: Arc<CommandState>,
    next_id: AtomicU64,
}

impl Harness {
    /// Fresh memory store with [`TENANTS`] provisioned.
    pub async fn new() -> Self {
        Self::with_settings(GatewaySettings::default()).await
    }

    pub async fn with_settings(settings: GatewaySettings) -> Self {
        Self::with_db(Arc::new(MemoryDatabase::new()), settings).await
    }

    pub async fn with_db(db: Arc<dyn Database>, settings: GatewaySettings) -> Self {
        let state = CommandState::open(Arc::clone(&db), settings)
            .await
            .expect("Failed to open command state");
        for (namespace, username, secret) in TENANTS {
            state
                .authorizer()
                .provision(namespace.as_bytes(), username.as_bytes(), secret.as_bytes())
                .await
                .expect("Failed to provision tenant");
        }

        Self {
            db,
            router: CommandRouter::with_default_commands().expect("Failed to build router"),
            state: Arc::new(state),
            next_id: AtomicU64::new(1),
        }
    }

    /// New unbound session.
    pub fn session(&self) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Session::new(ConnectionId(id), None)
    }

    /// Run a whitespace-separated command line.
    pub async fn run(&self, session: &mut Session, line: &str) -> RespValue {
        let mut parts = line.split_whitespace();
        let verb = parts.next().expect("empty command line");
        let args = parts.map(|p| Bytes::copy_from_slice(p.as_bytes())).collect();
        self.dispatch(session, Command::new(verb, args)).await
    }

    /// Run a command with binary arguments.
    pub async fn run_args(&self, session: &mut Session, verb: &str, args: &[&[u8]]) -> RespValue {
        let args = args.iter().map(|a| Bytes::copy_from_slice(a)).collect();
        self.dispatch(session, Command::new(verb, args)).await
    }

    pub async fn dispatch(&self, session: &mut Session, cmd: Command) -> RespValue {
        self.router
            .dispatch(session, cmd, Arc::clone(&self.state))
            .await
    }

    /// Session bound to `namespace` with a transaction open.
    pub async fn open_session(&self, namespace: &str) -> Session {
        let (_, username, secret) = TENANTS
            .iter()
            .find(|(ns, _, _)| *ns == namespace)
            .copied()
            .expect("unknown tenant");

        let mut session = self.session();
        let reply = self
            .run(&mut session, &format!("chroot {} {} {}", namespace, username, secret))
            .await;
        assert_eq!(reply, RespValue::ok());
        let reply = self.run(&mut session, "begin").await;
        assert_eq!(tag(&reply), "READ_VERSION");
        session
    }
}

/// First element of an array reply, as a string.
pub fn tag(reply: &RespValue) -> &str {
    reply
        .as_array()
        .and_then(|items| items.first())
        .and_then(|item| item.as_str())
        .unwrap_or_else(|| panic!("not a tagged reply: {:?}", reply))
}

/// Message of an error reply.
pub fn error_message(reply: &RespValue) -> &str {
    &reply
        .as_error()
        .unwrap_or_else(|| panic!("not an error reply: {:?}", reply))
        .message
}

/// `[[key, value], ...]` reply built from pairs.
pub fn pairs(items: &[(&[u8], &[u8])]) -> RespValue {
    RespValue::array(
        items
            .iter()
            .map(|(k, v)| {
                RespValue::array(vec![
                    RespValue::bulk(Bytes::copy_from_slice(k)),
                    RespValue::bulk(Bytes::copy_from_slice(v)),
                ])
            })
            .collect(),
    )
}

/// Store wrapper whose range reads fail part way once armed.
pub struct FaultyDatabase {
    inner: MemoryDatabase,
    armed: Arc<AtomicBool>,
    fail_after: usize,
}

impl FaultyDatabase {
    pub fn new(fail_after: usize) -> Self {
        Self {
            inner: MemoryDatabase::new(),
            armed: Arc::new(AtomicBool::new(false)),
            fail_after,
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl Database for FaultyDatabase {
    fn create_transaction(&self) -> StoreResult<Box<dyn Transaction>> {
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.create_transaction()?,
            armed: Arc::clone(&self.armed),
            fail_after: self.fail_after,
        }))
    }
}

struct FaultyTransaction {
    inner: Box<dyn Transaction>,
    armed: Arc<AtomicBool>,
    fail_after: usize,
}

impl Transaction for FaultyTransaction {
    fn read_version(&mut self) -> StoreFuture<'_, i64> {
        self.inner.read_version()
    }

    fn get<'a>(&'a mut self, key: &'a [u8]) -> StoreFuture<'a, Option<Bytes>> {
        self.inner.get(key)
    }

    fn get_range(&mut self, range: KeyRange) -> RangeIter<'_> {
        let rows = self.inner.get_range(range);
        if !self.armed.load(Ordering::SeqCst) {
            return rows;
        }
        let failure = StoreError::Unavailable {
            message: "scan interrupted".to_string(),
        };
        Box::new(rows.take(self.fail_after).chain(std::iter::once(Err(failure))))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.inner.set(key, value)
    }

    fn clear(&mut self, key: &[u8]) {
        self.inner.clear(key)
    }

    fn clear_range(&mut self, range: KeyRange) {
        self.inner.clear_range(range)
    }

    fn commit(&mut self) -> StoreFuture<'_, ()> {
        self.inner.commit()
    }

    fn committed_version(&self) -> StoreResult<i64> {
        self.inner.committed_version()
    }

    fn cancel(&mut self) {
        self.inner.cancel()
    }
}
