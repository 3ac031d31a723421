//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the collaborators from configuration
//! - Start subsystems in dependency order
//! - Block until the shutdown pass completes, then drain and report
//!
//! # Design Decisions
//! - Listeners come up before the wallet so status is always answerable
//! - A failed initial load is fatal and stops the process before any sync
//! - The exit status reflects the shutdown trigger, not how cleanly it ran

use std::sync::Arc;

use crate::chain::{ChainSyncSession, ChainTransport, WsTransport};
use crate::config::WalletConfig;
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownTrigger};
use crate::lifecycle::signals::spawn_signal_listener;
use crate::rpc::ServiceBridge;
use crate::wallet::{Credentials, FileWalletStore, WalletLoader, WalletStore};

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
        }
    }
}

/// Wires every subsystem together and runs the process to completion.
pub struct ProcessMain {
    config: WalletConfig,
    store: Arc<dyn WalletStore>,
    transport: Arc<dyn ChainTransport>,
    shutdown: ShutdownCoordinator,
}

impl ProcessMain {
    /// Use the file wallet store and WebSocket chain transport.
    pub fn new(config: WalletConfig) -> Self {
        let store = Arc::new(FileWalletStore::new(
            config.wallet.data_dir.clone(),
            config.wallet.sync_poll_interval(),
        ));
        let transport = Arc::new(WsTransport::new(
            config.chain.connect_timeout(),
            config.chain.request_timeout(),
        ));
        Self {
            config,
            store,
            transport,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn WalletStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn ChainTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// The coordinator `run` will use; lets callers trigger or observe
    /// shutdown from outside.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    pub async fn run(self) -> ExitStatus {
        let Self {
            config,
            store,
            transport,
            shutdown,
        } = self;
        let drain = config.shutdown.drain_timeout();

        tracing::info!(version = env!("CARGO_PKG_VERSION"), "podwallet starting");
        let _signals = spawn_signal_listener(shutdown.clone());

        let loader = WalletLoader::new(store, &shutdown);

        let bridge = match ServiceBridge::start(&config.rpc, loader.clone(), &shutdown).await {
            Ok(bridge) => bridge,
            Err(e) => {
                tracing::error!(error = %e, "Unable to start RPC listeners");
                fail(&shutdown, e.to_string()).await;
                return ExitStatus::Failure;
            }
        };

        if let Err(e) = loader.run_after_load(|wallet| {
            tracing::info!(wallet = %wallet.name(), height = wallet.synced_height(), "Wallet ready");
        }) {
            tracing::debug!(error = %e, "Skipping wallet readiness log");
        }

        if config.wallet.no_initial_load {
            tracing::info!("Initial wallet load skipped, waiting for an RPC load");
        } else {
            let credentials = Credentials::new(config.wallet.passphrase.clone().unwrap_or_default());
            if let Err(e) = loader.load(&credentials).await {
                tracing::error!(error = %e, "Failed to load wallet");
                fail(&shutdown, e.to_string()).await;
                bridge.join(drain).await;
                return ExitStatus::Failure;
            }
        }

        let session = ChainSyncSession::new(transport, &config.chain, loader, &shutdown);
        let rpc = bridge.clone();
        session.set_chain_server_hook(move |client| rpc.set_chain_server(client));
        bridge.set_association(session.association());
        let sync = session.spawn();

        shutdown.wait().await;

        if !bridge.join(drain).await {
            tracing::warn!("RPC listeners were aborted");
        }
        if tokio::time::timeout(drain, sync).await.is_err() {
            tracing::warn!("Chain sync did not stop in time");
        }

        let status = match shutdown.trigger() {
            Some(trigger) if trigger.is_fatal() => ExitStatus::Failure,
            _ => ExitStatus::Success,
        };
        tracing::info!(exit_code = status.code(), "Shutdown complete");
        status
    }
}

impl std::fmt::Debug for ProcessMain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessMain")
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

/// Request a fatal shutdown off the async workers and wait for it.
async fn fail(shutdown: &ShutdownCoordinator, reason: String) {
    let coordinator = shutdown.clone();
    let pass = tokio::task::spawn_blocking(move || {
        coordinator.request_shutdown(ShutdownTrigger::Fatal(reason))
    });
    if let Err(e) = pass.await {
        tracing::error!(error = %e, "Shutdown pass did not complete");
    }
    shutdown.wait().await;
}
