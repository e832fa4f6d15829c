//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: store → authorization directory and tenants → listener
//! - Shutdown order: listener → connections → store

use crate::core::config::Config;
use crate::gateway::{CommandRouter, CommandState, GatewayService};
use crate::net::TcpListener;
use crate::store::{Database, MemoryDatabase};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long to wait for the accept loop to drain on shutdown.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Store health.
    pub store: ComponentHealth,
    /// Gateway command state health.
    pub gateway: ComponentHealth,
    /// Listener health.
    pub listener: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            store: ComponentHealth::Starting,
            gateway: ComponentHealth::Starting,
            listener: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.store == ComponentHealth::Healthy
            && self.gateway == ComponentHealth::Healthy
            && self.listener == ComponentHealth::Healthy
    }

    /// Check if the runtime is alive (not failed).
    pub fn is_alive(&self) -> bool {
        ![self.store, self.gateway, self.listener].contains(&ComponentHealth::Failed)
    }
}

/// Gateway runtime holding all component handles.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Backing store, once opened.
    db: Option<Arc<dyn Database>>,

    /// Gateway service, once built.
    service: Option<Arc<GatewayService>>,

    /// Address actually bound.
    local_addr: Option<SocketAddr>,

    /// Runtime health status.
    health: RuntimeHealth,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Accept loop task handle.
    serve_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            db: None,
            service: None,
            local_addr: None,
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            serve_handle: None,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the backing store (if opened).
    pub fn db(&self) -> Option<&Arc<dyn Database>> {
        self.db.as_ref()
    }

    /// Address the listener is bound to (once started).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.health.is_ready()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Initialize and start all runtime components.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(bind = %self.config.server.bind, "starting kvgate runtime");

        let db = self.init_store();
        let state = self.init_gateway(Arc::clone(&db)).await?;
        self.start_listener(state).await?;

        self.running.store(true, Ordering::Release);
        tracing::info!("kvgate runtime started");

        Ok(())
    }

    fn init_store(&mut self) -> Arc<dyn Database> {
        let db: Arc<dyn Database> =
            Arc::new(MemoryDatabase::with_max_history(self.config.store.max_history));
        self.db = Some(Arc::clone(&db));
        self.health.store = ComponentHealth::Healthy;

        tracing::info!(
            max_history = self.config.store.max_history,
            "memory store initialized"
        );
        db
    }

    /// Open the authorization directory and provision configured tenants.
    async fn init_gateway(&mut self, db: Arc<dyn Database>) -> Result<Arc<CommandState>> {
        let settings = self.config.gateway_settings();
        let state = match CommandState::open(db, settings).await {
            Ok(state) => state,
            Err(e) => {
                self.health.gateway = ComponentHealth::Failed;
                return Err(e).context("failed to open authorization directory");
            }
        };

        for tenant in &self.config.tenants {
            state
                .authorizer()
                .provision(
                    tenant.namespace.as_bytes(),
                    tenant.username.as_bytes(),
                    tenant.secret.as_bytes(),
                )
                .await
                .with_context(|| format!("failed to provision tenant {}", tenant.namespace))?;
            tracing::info!(
                namespace = %tenant.namespace,
                username = %tenant.username,
                "tenant provisioned"
            );
        }

        self.health.gateway = ComponentHealth::Healthy;
        Ok(Arc::new(state))
    }

    async fn start_listener(&mut self, state: Arc<CommandState>) -> Result<()> {
        let listener = TcpListener::new(self.config.listener_config()?, self.shutdown_rx.clone());
        let router = CommandRouter::with_default_commands().context("invalid command table")?;
        let service = Arc::new(GatewayService::new(
            router,
            state,
            listener,
            self.shutdown_rx.clone(),
        ));

        let bound = match service.bind().await {
            Ok(bound) => bound,
            Err(e) => {
                self.health.listener = ComponentHealth::Failed;
                return Err(e).context("failed to start gateway listener");
            }
        };
        self.local_addr = bound.local_addr().ok();

        let serving = Arc::clone(&service);
        self.serve_handle = Some(tokio::spawn(async move { serving.serve(bound).await }));
        self.service = Some(service);
        self.health.listener = ComponentHealth::Healthy;
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the runtime until ctrl-c or [`Runtime::shutdown`].
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }

    /// Stop all runtime components.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping kvgate runtime");
        self.running.store(false, Ordering::Release);

        // Connection tasks watch the same channel and abandon their sessions.
        let _ = self.shutdown_tx.send(true);

        self.health.listener = ComponentHealth::Stopping;
        if let Some(handle) = self.serve_handle.take() {
            match tokio::time::timeout(STOP_TIMEOUT, handle).await {
                Ok(Ok(())) => tracing::info!("gateway listener stopped"),
                Ok(Err(e)) => tracing::warn!(error = %e, "gateway listener task panicked"),
                Err(_) => tracing::warn!("gateway listener stop timed out"),
            }
        }
        self.service = None;
        self.health.listener = ComponentHealth::Stopped;

        self.health.gateway = ComponentHealth::Stopped;
        self.db = None;
        self.health.store = ComponentHealth::Stopped;

        tracing::info!("kvgate runtime stopped");
        Ok(())
    }
}
