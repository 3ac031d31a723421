//! Wallet load state machine.
//!
//! The loader owns the single "current" wallet. Subsystems that need the
//! wallet but may start before it exists register a callback with
//! [`WalletLoader::run_after_load`]; queued callbacks are drained exactly
//! once, in registration order, when a load succeeds.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::lifecycle::ShutdownCoordinator;
use crate::observability::metrics;
use crate::wallet::store::{Credentials, StoreError, WalletHandle, WalletStore};

/// Errors from loader operations.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("wallet already loaded")]
    AlreadyLoaded,

    #[error("wallet is not loaded")]
    NotLoaded,

    #[error("failed to open wallet: {0}")]
    Open(#[source] StoreError),

    #[error("shutdown in progress")]
    ShutdownInProgress,
}

type AfterLoad = Box<dyn FnOnce(Arc<dyn WalletHandle>) + Send + 'static>;

#[derive(Default)]
struct LoadState {
    wallet: Option<Arc<dyn WalletHandle>>,
    pending: Vec<AfterLoad>,
}

struct LoaderInner {
    store: Arc<dyn WalletStore>,
    state: Mutex<LoadState>,
    // Serialises loads across the await on the store.
    load_lock: tokio::sync::Mutex<()>,
    shutdown: ShutdownCoordinator,
}

/// Owns the wallet open/close lifecycle.
#[derive(Clone)]
pub struct WalletLoader {
    inner: Arc<LoaderInner>,
}

impl WalletLoader {
    /// Create a loader and register a shutdown handler that closes any
    /// wallet still loaded at exit.
    pub fn new(store: Arc<dyn WalletStore>, shutdown: &ShutdownCoordinator) -> Self {
        let loader = Self {
            inner: Arc::new(LoaderInner {
                store,
                state: Mutex::new(LoadState::default()),
                load_lock: tokio::sync::Mutex::new(()),
                shutdown: shutdown.clone(),
            }),
        };

        let on_exit = loader.clone();
        shutdown.register_fallible("wallet", move || match on_exit.unload() {
            Ok(()) | Err(LoaderError::NotLoaded) => Ok(()),
            Err(e) => Err(e),
        });

        loader
    }

    /// Run `callback` with the wallet now if one is loaded, otherwise once
    /// the next load succeeds.
    pub fn run_after_load<F>(&self, callback: F) -> Result<(), LoaderError>
    where
        F: FnOnce(Arc<dyn WalletHandle>) + Send + 'static,
    {
        if self.inner.shutdown.is_shutting_down() {
            return Err(LoaderError::ShutdownInProgress);
        }

        let wallet = {
            let mut state = self.inner.state.lock();
            match state.wallet.clone() {
                Some(w) => w,
                None => {
                    state.pending.push(Box::new(callback));
                    return Ok(());
                }
            }
        };

        callback(wallet);
        Ok(())
    }

    /// Open the wallet and deliver it to every queued callback.
    pub async fn load(&self, credentials: &Credentials) -> Result<Arc<dyn WalletHandle>, LoaderError> {
        let _guard = self.inner.load_lock.lock().await;

        if self.inner.shutdown.is_shutting_down() {
            return Err(LoaderError::ShutdownInProgress);
        }
        if self.is_loaded() {
            return Err(LoaderError::AlreadyLoaded);
        }

        let wallet = self
            .inner
            .store
            .open(credentials)
            .await
            .map_err(LoaderError::Open)?;

        // The shutdown check and the store share the state lock with the exit
        // handler's unload: either it finds this wallet, or we see shutdown
        // here and close the wallet ourselves.
        let pending = {
            let mut state = self.inner.state.lock();
            if self.inner.shutdown.is_shutting_down() {
                None
            } else {
                state.wallet = Some(wallet.clone());
                Some(std::mem::take(&mut state.pending))
            }
        };
        let Some(pending) = pending else {
            if let Err(e) = self.inner.store.close(&wallet) {
                tracing::warn!(error = %e, "Failed to close wallet opened during shutdown");
            }
            return Err(LoaderError::ShutdownInProgress);
        };

        metrics::set_wallet_loaded(true);
        tracing::info!(wallet = %wallet.name(), callbacks = pending.len(), "Wallet loaded");

        for callback in pending {
            callback(wallet.clone());
        }

        Ok(wallet)
    }

    /// Close the loaded wallet.
    ///
    /// Allowed during shutdown: this is what the exit handler calls.
    pub fn unload(&self) -> Result<(), LoaderError> {
        let wallet = self
            .inner
            .state
            .lock()
            .wallet
            .take()
            .ok_or(LoaderError::NotLoaded)?;

        metrics::set_wallet_loaded(false);
        tracing::info!(wallet = %wallet.name(), "Unloading wallet");

        self.inner.store.close(&wallet).map_err(LoaderError::Open)
    }

    /// The loaded wallet, if any.
    pub fn loaded_wallet(&self) -> Option<Arc<dyn WalletHandle>> {
        self.inner.state.lock().wallet.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.state.lock().wallet.is_some()
    }

    /// Number of callbacks waiting for a load.
    pub fn pending_callbacks(&self) -> usize {
        self.inner.state.lock().pending.len()
    }
}

impl std::fmt::Debug for WalletLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletLoader")
            .field("loaded", &self.is_loaded())
            .field("pending_callbacks", &self.pending_callbacks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainClient;
    use crate::lifecycle::ShutdownTrigger;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubWallet {
        closed: AtomicBool,
    }

    impl WalletHandle for StubWallet {
        fn name(&self) -> &str {
            "stub"
        }
        fn mark_synchronized(&self, _synced: bool) {}
        fn is_synchronized(&self) -> bool {
            false
        }
        fn synced_height(&self) -> u64 {
            0
        }
        fn synchronize_with(&self, _client: Arc<dyn ChainClient>) {}
        fn stop_sync_bookkeeping(&self) {}
        fn start_sync_bookkeeping(&self) {}
        fn is_shutting_down(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct StubStore {
        opens: AtomicUsize,
        closes: AtomicUsize,
        reject: AtomicBool,
        shutdown_on_open: Mutex<Option<ShutdownCoordinator>>,
    }

    #[async_trait]
    impl WalletStore for StubStore {
        async fn open(&self, _credentials: &Credentials) -> Result<Arc<dyn WalletHandle>, StoreError> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(StoreError::InvalidPassphrase);
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(shutdown) = self.shutdown_on_open.lock().take() {
                shutdown.request_shutdown(ShutdownTrigger::StopRequest);
            }
            Ok(Arc::new(StubWallet::default()))
        }

        fn close(&self, _wallet: &Arc<dyn WalletHandle>) -> Result<(), StoreError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn loader() -> (WalletLoader, Arc<StubStore>, ShutdownCoordinator) {
        let shutdown = ShutdownCoordinator::new();
        let store = Arc::new(StubStore::default());
        (WalletLoader::new(store.clone(), &shutdown), store, shutdown)
    }

    #[tokio::test]
    async fn second_load_is_rejected() {
        let (loader, _, _) = loader();
        loader.load(&Credentials::default()).await.unwrap();
        let err = loader.load(&Credentials::default()).await.unwrap_err();
        assert!(matches!(err, LoaderError::AlreadyLoaded));
    }

    #[tokio::test]
    async fn load_after_unload_succeeds() {
        let (loader, store, _) = loader();
        loader.load(&Credentials::default()).await.unwrap();
        loader.unload().unwrap();
        assert!(!loader.is_loaded());
        loader.load(&Credentials::default()).await.unwrap();
        assert_eq!(store.opens.load(Ordering::SeqCst), 2);
        assert_eq!(store.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unload_without_wallet_fails() {
        let (loader, _, _) = loader();
        assert!(matches!(loader.unload(), Err(LoaderError::NotLoaded)));
    }

    #[tokio::test]
    async fn queued_callbacks_fire_once_in_order() {
        let (loader, _, _) = loader();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["f1", "f2"] {
            let order = order.clone();
            loader
                .run_after_load(move |_w| order.lock().push(name))
                .unwrap();
        }
        assert_eq!(loader.pending_callbacks(), 2);

        loader.load(&Credentials::default()).await.unwrap();
        assert_eq!(*order.lock(), vec!["f1", "f2"]);
        assert_eq!(loader.pending_callbacks(), 0);

        let o = order.clone();
        loader.run_after_load(move |_w| o.lock().push("f3")).unwrap();
        assert_eq!(*order.lock(), vec!["f1", "f2", "f3"]);

        // A reload does not replay callbacks that already fired.
        loader.unload().unwrap();
        loader.load(&Credentials::default()).await.unwrap();
        assert_eq!(order.lock().len(), 3);
    }

    #[tokio::test]
    async fn callbacks_receive_the_loaded_wallet() {
        let (loader, _, _) = loader();
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        loader.run_after_load(move |w| *s.lock() = Some(w)).unwrap();

        let wallet = loader.load(&Credentials::default()).await.unwrap();
        let delivered = seen.lock().clone().unwrap();
        assert!(Arc::ptr_eq(&wallet, &delivered));
    }

    #[tokio::test]
    async fn open_failure_leaves_loader_empty() {
        let (loader, store, _) = loader();
        store.reject.store(true, Ordering::SeqCst);
        let err = loader.load(&Credentials::default()).await.unwrap_err();
        assert!(matches!(err, LoaderError::Open(StoreError::InvalidPassphrase)));
        assert!(!loader.is_loaded());
    }

    #[tokio::test]
    async fn shutdown_closes_loaded_wallet() {
        let (loader, store, shutdown) = loader();
        loader.load(&Credentials::default()).await.unwrap();

        shutdown.request_shutdown(ShutdownTrigger::StopRequest);
        assert_eq!(store.closes.load(Ordering::SeqCst), 1);
        assert!(!loader.is_loaded());

        let err = loader.load(&Credentials::default()).await.unwrap_err();
        assert!(matches!(err, LoaderError::ShutdownInProgress));
        assert!(matches!(
            loader.run_after_load(|_| {}),
            Err(LoaderError::ShutdownInProgress)
        ));
    }

    #[tokio::test]
    async fn shutdown_while_opening_closes_the_new_wallet() {
        let (loader, store, shutdown) = loader();
        *store.shutdown_on_open.lock() = Some(shutdown.clone());

        let err = loader.load(&Credentials::default()).await.unwrap_err();

        assert!(matches!(err, LoaderError::ShutdownInProgress));
        assert!(!loader.is_loaded());
        assert_eq!(store.opens.load(Ordering::SeqCst), 1);
        assert_eq!(store.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn load_racing_shutdown_never_leaks_an_open_wallet() {
        for _ in 0..200 {
            let (loader, store, shutdown) = loader();

            let load = tokio::spawn({
                let loader = loader.clone();
                async move { loader.load(&Credentials::default()).await }
            });
            let stop = tokio::task::spawn_blocking(move || {
                shutdown.request_shutdown(ShutdownTrigger::StopRequest)
            });

            let loaded = load.await.unwrap();
            assert!(stop.await.unwrap());

            assert!(!loader.is_loaded());
            assert_eq!(store.opens.load(Ordering::SeqCst), store.closes.load(Ordering::SeqCst));
            if loaded.is_ok() {
                assert_eq!(store.closes.load(Ordering::SeqCst), 1);
            }
        }
    }
}
