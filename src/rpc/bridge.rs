//! RPC listeners and their wiring to the rest of the process.
//!
//! The bridge binds its listeners before any wallet or chain session exists
//! so status queries work from the first moment. The chain client and the
//! association slot are plugged in later, whenever they become available.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chain::{Association, ChainClient};
use crate::config::RpcConfig;
use crate::lifecycle::{ShutdownCoordinator, ShutdownTrigger};
use crate::rpc::types::StatusReport;
use crate::rpc::{experimental, legacy};
use crate::wallet::{WalletHandle, WalletLoader};

/// Errors starting the RPC listeners.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid bind address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

struct ChainServer {
    client: Arc<dyn ChainClient>,
}

/// State shared by every RPC handler.
#[derive(Clone)]
pub struct RpcState {
    pub loader: WalletLoader,
    pub shutdown: ShutdownCoordinator,
    chain: Arc<ArcSwapOption<ChainServer>>,
    association: Arc<ArcSwapOption<Association>>,
    started: Instant,
}

impl RpcState {
    fn new(loader: WalletLoader, shutdown: ShutdownCoordinator) -> Self {
        Self {
            loader,
            shutdown,
            chain: Arc::new(ArcSwapOption::empty()),
            association: Arc::new(ArcSwapOption::empty()),
            started: Instant::now(),
        }
    }

    /// The chain client RPC methods may use, if one is live.
    pub fn chain_client(&self) -> Option<Arc<dyn ChainClient>> {
        self.chain
            .load_full()
            .map(|server| server.client.clone())
            .filter(|client| client.is_connected())
    }

    /// Offer a freshly loaded wallet to the live chain session.
    pub fn associate(&self, wallet: Arc<dyn WalletHandle>) {
        if let Some(association) = self.association.load_full() {
            association.invoke_if_present(wallet);
        }
    }

    pub fn status(&self) -> StatusReport {
        let wallet = self.loader.loaded_wallet();
        StatusReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            wallet_loaded: wallet.is_some(),
            wallet_name: wallet.as_ref().map(|w| w.name().to_string()),
            synchronized: wallet.as_ref().is_some_and(|w| w.is_synchronized()),
            synced_height: wallet.as_ref().map_or(0, |w| w.synced_height()),
            chain_connected: self.chain_client().is_some(),
            shutting_down: self.shutdown.is_shutting_down(),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }

    /// Ask the process to stop without blocking the calling handler.
    ///
    /// Returns false if shutdown was already under way.
    pub fn request_stop(&self) -> bool {
        if self.shutdown.is_shutting_down() {
            return false;
        }
        let shutdown = self.shutdown.clone();
        tokio::task::spawn_blocking(move || shutdown.request_shutdown(ShutdownTrigger::StopRequest));
        true
    }
}

struct Listener {
    name: &'static str,
    addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            tracing::info!(listener = self.name, address = %self.addr, "Stopping RPC listener");
        }
    }
}

struct BridgeInner {
    state: RpcState,
    legacy: Arc<Listener>,
    experimental: Option<Arc<Listener>>,
}

/// The RPC-facing half of the process.
#[derive(Clone)]
pub struct ServiceBridge {
    inner: Arc<BridgeInner>,
}

impl ServiceBridge {
    /// Bind and start the listeners, then register [`ServiceBridge::stop`]
    /// with the coordinator.
    pub async fn start(
        config: &RpcConfig,
        loader: WalletLoader,
        shutdown: &ShutdownCoordinator,
    ) -> Result<Self, BridgeError> {
        let state = RpcState::new(loader, shutdown.clone());

        let experimental = if config.experimental.enabled {
            let router = experimental::router(state.clone(), config);
            Some(spawn_listener("experimental", &config.experimental.bind_address, router).await?)
        } else {
            None
        };

        let router = legacy::router(state.clone(), config);
        let legacy = match spawn_listener("legacy", &config.legacy.bind_address, router).await {
            Ok(listener) => listener,
            Err(e) => {
                if let Some(experimental) = &experimental {
                    experimental.stop();
                }
                return Err(e);
            }
        };

        let bridge = Self {
            inner: Arc::new(BridgeInner {
                state,
                legacy,
                experimental,
            }),
        };

        let on_exit = bridge.clone();
        shutdown.register("rpc", move || on_exit.stop());

        Ok(bridge)
    }

    /// Publish the chain client RPC methods should use, or withdraw it.
    pub fn set_chain_server(&self, client: Option<Arc<dyn ChainClient>>) {
        match &client {
            Some(c) => tracing::debug!(client = c.id(), "RPC chain server set"),
            None => tracing::debug!("RPC chain server cleared"),
        }
        self.inner
            .state
            .chain
            .store(client.map(|client| Arc::new(ChainServer { client })));
    }

    pub fn chain_server(&self) -> Option<Arc<dyn ChainClient>> {
        self.inner.state.chain_client()
    }

    /// Attach the chain session's association slot so wallets loaded over
    /// RPC are handed to the live session.
    pub fn set_association(&self, association: Association) {
        self.inner.state.association.store(Some(Arc::new(association)));
    }

    /// Forward a client's stop request to the coordinator. The shutdown
    /// pass runs on the blocking pool; see [`RpcState::request_stop`].
    pub fn request_stop(&self) -> bool {
        self.inner.state.request_stop()
    }

    /// Begin graceful close of every listener, legacy first. In-flight
    /// requests drain; [`ServiceBridge::join`] waits for them.
    pub fn stop(&self) {
        self.inner.legacy.stop();
        if let Some(experimental) = &self.inner.experimental {
            experimental.stop();
        }
    }

    /// Wait for the listeners to drain in-flight requests. Listeners still
    /// running after `timeout` are aborted. Returns true if all drained.
    pub async fn join(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut drained = true;

        let listeners = std::iter::once(&self.inner.legacy).chain(self.inner.experimental.iter());
        for listener in listeners {
            let Some(mut task) = listener.task.lock().take() else { continue };
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                tracing::warn!(listener = listener.name, "RPC listener did not drain in time, aborting");
                task.abort();
                drained = false;
            }
        }
        drained
    }

    pub fn state(&self) -> &RpcState {
        &self.inner.state
    }

    pub fn legacy_addr(&self) -> SocketAddr {
        self.inner.legacy.addr
    }

    pub fn experimental_addr(&self) -> Option<SocketAddr> {
        self.inner.experimental.as_ref().map(|l| l.addr)
    }
}

impl std::fmt::Debug for ServiceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBridge")
            .field("legacy_addr", &self.legacy_addr())
            .field("experimental_addr", &self.experimental_addr())
            .finish()
    }
}

async fn spawn_listener(
    name: &'static str,
    bind_address: &str,
    router: axum::Router,
) -> Result<Arc<Listener>, BridgeError> {
    let addr: SocketAddr = bind_address.parse().map_err(|e: std::net::AddrParseError| {
        BridgeError::InvalidAddress {
            address: bind_address.to_string(),
            reason: e.to_string(),
        }
    })?;

    let tcp = TcpListener::bind(addr)
        .await
        .map_err(|source| BridgeError::Bind { address: addr, source })?;
    let local_addr = tcp
        .local_addr()
        .map_err(|source| BridgeError::Bind { address: addr, source })?;

    tracing::info!(listener = name, address = %local_addr, "RPC listener bound");

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let result = axum::serve(tcp, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            })
            .await;

        match result {
            Ok(()) => tracing::info!(listener = name, "RPC listener stopped"),
            Err(e) => tracing::error!(listener = name, error = %e, "RPC listener failed"),
        }
    });

    Ok(Arc::new(Listener {
        name,
        addr: local_addr,
        stop_tx,
        task: Mutex::new(Some(task)),
    }))
}
