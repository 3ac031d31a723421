//! Reconnecting chain server session.
//!
//! One task runs [`ChainSyncSession::run`]: dial, publish the client, hand it
//! to whichever wallet is (or later becomes) loaded, wait for the transport to
//! drop, revoke the association, repeat. The session never holds a reference
//! to the wallet itself; it only sees wallets through loader callbacks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chain::association::Association;
use crate::chain::client::{ChainClient, ChainCredentials, ChainTransport};
use crate::config::{BackoffConfig, ChainConfig};
use crate::lifecycle::{ShutdownCoordinator, ShutdownTrigger};
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::wallet::{WalletHandle, WalletLoader};

/// Connection state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Connecting,
    Connected,
    /// Connected and handed to a wallet.
    Associated,
    /// Terminal.
    ShuttingDown,
}

/// Receives the current chain client, or `None` once it is gone.
pub type ChainServerHook = Arc<dyn Fn(Option<Arc<dyn ChainClient>>) + Send + Sync>;

struct SessionInner {
    transport: Arc<dyn ChainTransport>,
    address: String,
    credentials: ChainCredentials,
    backoff: BackoffConfig,
    auth_failure_fatal: bool,
    loader: WalletLoader,
    shutdown: ShutdownCoordinator,
    association: Association,
    state_tx: watch::Sender<SyncState>,
    current: Mutex<Option<Arc<dyn ChainClient>>>,
    dial_attempts: AtomicU64,
    // Set while a wrapper sits in the loader's post-load queue.
    wrapper_queued: AtomicBool,
    chain_server_hook: Mutex<Option<ChainServerHook>>,
}

impl SessionInner {
    /// Move to `next` unless the session has already reached `ShuttingDown`.
    fn set_state(&self, next: SyncState) {
        self.state_tx.send_if_modified(|state| {
            if *state == SyncState::ShuttingDown || *state == next {
                return false;
            }
            tracing::trace!(from = ?*state, to = ?next, "Sync state change");
            *state = next;
            true
        });
    }

    fn notify_chain_server(&self, client: Option<Arc<dyn ChainClient>>) {
        let hook = self.chain_server_hook.lock().clone();
        if let Some(hook) = hook {
            hook(client);
        }
    }

    /// Wire `wallet` to `client`, provided `client` is still the live one.
    fn associate(&self, client: &Arc<dyn ChainClient>, wallet: Arc<dyn WalletHandle>) {
        let is_current = self
            .current
            .lock()
            .as_ref()
            .is_some_and(|current| current.id() == client.id());
        if !is_current || !client.is_connected() {
            tracing::debug!(client = client.id(), "Skipping association with stale chain client");
            return;
        }

        wallet.synchronize_with(client.clone());
        self.notify_chain_server(Some(client.clone()));
        self.set_state(SyncState::Associated);
        tracing::info!(wallet = %wallet.name(), client = client.id(), "Wallet associated with chain server");
    }

    fn take_current(&self) -> Option<Arc<dyn ChainClient>> {
        self.current.lock().take()
    }
}

/// Reconnecting session to the chain server.
#[derive(Clone)]
pub struct ChainSyncSession {
    inner: Arc<SessionInner>,
}

impl ChainSyncSession {
    /// Build a session and register its shutdown handler, which drops the
    /// live connection so the run loop wakes up and exits.
    pub fn new(
        transport: Arc<dyn ChainTransport>,
        config: &ChainConfig,
        loader: WalletLoader,
        shutdown: &ShutdownCoordinator,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Disconnected);
        let session = Self {
            inner: Arc::new(SessionInner {
                transport,
                address: config.address.clone(),
                credentials: ChainCredentials::new(&config.username, &config.password),
                backoff: config.backoff.clone(),
                auth_failure_fatal: config.auth_failure_fatal,
                loader,
                shutdown: shutdown.clone(),
                association: Association::new(),
                state_tx,
                current: Mutex::new(None),
                dial_attempts: AtomicU64::new(0),
                wrapper_queued: AtomicBool::new(false),
                chain_server_hook: Mutex::new(None),
            }),
        };

        let weak = Arc::downgrade(&session.inner);
        shutdown.register("chain session", move || {
            let Some(inner) = weak.upgrade() else { return };
            inner.state_tx.send_replace(SyncState::ShuttingDown);
            inner.association.clear();
            if let Some(client) = inner.take_current() {
                client.disconnect();
            }
        });

        session
    }

    /// Install the callback told about every chain client change.
    pub fn set_chain_server_hook<F>(&self, hook: F)
    where
        F: Fn(Option<Arc<dyn ChainClient>>) + Send + Sync + 'static,
    {
        *self.inner.chain_server_hook.lock() = Some(Arc::new(hook));
    }

    /// The association slot, for callers that load wallets outside the
    /// deferred-callback path.
    pub fn association(&self) -> Association {
        self.inner.association.clone()
    }

    pub fn state(&self) -> SyncState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state_tx.subscribe()
    }

    /// Dials attempted so far, successful or not.
    pub fn dial_attempts(&self) -> u64 {
        self.inner.dial_attempts.load(Ordering::SeqCst)
    }

    pub fn current_client(&self) -> Option<Arc<dyn ChainClient>> {
        self.inner.current.lock().clone()
    }

    /// Run the reconnect loop on a new task.
    pub fn spawn(&self) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run().await })
    }

    /// The reconnect loop. Returns once shutdown is requested or the loaded
    /// wallet stops on its own.
    pub async fn run(&self) {
        let inner = &self.inner;
        let mut backoff = Backoff::new(inner.backoff.clone());

        tracing::info!(address = %inner.address, "Starting chain sync");

        loop {
            if inner.shutdown.is_shutting_down() {
                break;
            }

            inner.set_state(SyncState::Connecting);
            let attempt = inner.dial_attempts.fetch_add(1, Ordering::SeqCst) + 1;

            let dialed = tokio::select! {
                result = inner.transport.dial(&inner.address, &inner.credentials) => result,
                _ = inner.shutdown.requested() => break,
            };

            let client = match dialed {
                Ok(client) => {
                    metrics::record_dial_attempt("connected");
                    backoff.reset();
                    client
                }
                Err(e) => {
                    inner.set_state(SyncState::Disconnected);

                    if e.is_auth() {
                        metrics::record_dial_attempt("auth_failed");
                        if inner.auth_failure_fatal {
                            tracing::error!(error = %e, "Chain server rejected credentials");
                            self.request_fatal(e.to_string()).await;
                            break;
                        }
                    } else {
                        metrics::record_dial_attempt("failed");
                    }

                    let delay = backoff.next_delay();
                    if backoff.failures() == 1 {
                        tracing::warn!(attempt, error = %e, retry_in = ?delay, "Unable to reach chain server, retrying");
                    } else {
                        tracing::debug!(attempt, error = %e, retry_in = ?delay, "Retrying chain server dial");
                    }

                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = inner.shutdown.requested() => break,
                        }
                    }
                    continue;
                }
            };

            *inner.current.lock() = Some(client.clone());
            // The shutdown handler only sees clients published before it ran.
            if inner.shutdown.is_shutting_down() {
                inner.take_current();
                client.disconnect();
                break;
            }

            inner.set_state(SyncState::Connected);
            metrics::set_chain_connected(true);
            tracing::info!(attempt, client = client.id(), address = %client.address(), "Connected to chain server");

            let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
            let associated_client = client.clone();
            inner.association.set(move |wallet| {
                if let Some(inner) = weak.upgrade() {
                    inner.associate(&associated_client, wallet);
                }
            });

            self.queue_association_wrapper();

            tokio::select! {
                _ = client.wait_for_shutdown() => {}
                _ = inner.shutdown.requested() => client.disconnect(),
            }

            inner.association.clear();
            inner.take_current();
            inner.notify_chain_server(None);
            metrics::set_chain_connected(false);

            if inner.shutdown.is_shutting_down() {
                break;
            }

            inner.set_state(SyncState::Disconnected);
            tracing::warn!(client = client.id(), "Chain server connection lost");

            if let Some(wallet) = inner.loader.loaded_wallet() {
                if wallet.is_shutting_down() {
                    tracing::info!(wallet = %wallet.name(), "Wallet stopped, ending chain sync");
                    break;
                }
                wallet.mark_synchronized(false);
                wallet.stop_sync_bookkeeping();
                wallet.start_sync_bookkeeping();
            }
        }

        if inner.shutdown.is_shutting_down() {
            inner.set_state(SyncState::ShuttingDown);
        }
        tracing::info!(attempts = self.dial_attempts(), "Chain sync stopped");
    }

    /// Hand the next loaded wallet to whatever association is current when
    /// it loads. At most one wrapper waits in the loader at a time.
    fn queue_association_wrapper(&self) {
        let inner = &self.inner;
        if inner.wrapper_queued.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        let association = inner.association.clone();
        let queued = inner.loader.run_after_load(move |wallet| {
            if let Some(inner) = weak.upgrade() {
                inner.wrapper_queued.store(false, Ordering::SeqCst);
            }
            association.invoke_if_present(wallet);
        });
        if let Err(e) = queued {
            inner.wrapper_queued.store(false, Ordering::SeqCst);
            tracing::debug!(error = %e, "Not waiting for a wallet");
        }
    }

    async fn request_fatal(&self, reason: String) {
        let shutdown = self.inner.shutdown.clone();
        let pass = tokio::task::spawn_blocking(move || {
            shutdown.request_shutdown(ShutdownTrigger::Fatal(reason))
        });
        if let Err(e) = pass.await {
            tracing::error!(error = %e, "Shutdown pass did not complete");
        }
    }
}

impl std::fmt::Debug for ChainSyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSyncSession")
            .field("address", &self.inner.address)
            .field("state", &self.state())
            .field("dial_attempts", &self.dial_attempts())
            .finish()
    }
}
