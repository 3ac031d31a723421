//! Shared stub collaborators for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::watch;

use podwallet::chain::{ChainCallError, ChainClient, ChainCredentials, ChainTransport, DialError};
use podwallet::wallet::{Credentials, StoreError, WalletHandle, WalletStore};

/// Something the wallet was told to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    SynchronizeWith(u64),
    MarkSynchronized(bool),
    StopBookkeeping,
    StartBookkeeping,
    Closed,
}

#[derive(Default)]
pub struct RecordingWallet {
    events: Mutex<Vec<WalletEvent>>,
    synced: AtomicBool,
    stopped: AtomicBool,
}

impl RecordingWallet {
    pub fn events(&self) -> Vec<WalletEvent> {
        self.events.lock().clone()
    }

    pub fn synchronized_with(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WalletEvent::SynchronizeWith(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Simulate the wallet being stopped from the inside.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn record(&self, event: WalletEvent) {
        self.events.lock().push(event);
    }
}

impl WalletHandle for RecordingWallet {
    fn name(&self) -> &str {
        "recording"
    }

    fn mark_synchronized(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
        self.record(WalletEvent::MarkSynchronized(synced));
    }

    fn is_synchronized(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn synced_height(&self) -> u64 {
        0
    }

    fn synchronize_with(&self, client: Arc<dyn ChainClient>) {
        self.record(WalletEvent::SynchronizeWith(client.id()));
    }

    fn stop_sync_bookkeeping(&self) {
        self.record(WalletEvent::StopBookkeeping);
    }

    fn start_sync_bookkeeping(&self) {
        self.record(WalletEvent::StartBookkeeping);
    }

    fn is_shutting_down(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Wallet store handing out [`RecordingWallet`]s.
#[derive(Default)]
pub struct RecordingStore {
    opened: Mutex<Vec<Arc<RecordingWallet>>>,
    closes: AtomicUsize,
    reject: AtomicBool,
}

impl RecordingStore {
    pub fn rejecting() -> Self {
        let store = Self::default();
        store.reject.store(true, Ordering::SeqCst);
        store
    }

    pub fn last_wallet(&self) -> Option<Arc<RecordingWallet>> {
        self.opened.lock().last().cloned()
    }

    pub fn opens(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletStore for RecordingStore {
    async fn open(&self, _credentials: &Credentials) -> Result<Arc<dyn WalletHandle>, StoreError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidPassphrase);
        }
        let wallet = Arc::new(RecordingWallet::default());
        self.opened.lock().push(wallet.clone());
        Ok(wallet)
    }

    fn close(&self, _wallet: &Arc<dyn WalletHandle>) -> Result<(), StoreError> {
        if let Some(wallet) = self.last_wallet() {
            wallet.record(WalletEvent::Closed);
            wallet.stop();
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory chain client; `disconnect` doubles as a remote hang-up.
pub struct ScriptedClient {
    id: u64,
    up: watch::Sender<bool>,
}

impl ScriptedClient {
    fn new(id: u64) -> Self {
        let (up, _) = watch::channel(true);
        Self { id, up }
    }
}

#[async_trait]
impl ChainClient for ScriptedClient {
    fn id(&self) -> u64 {
        self.id
    }

    fn address(&self) -> &str {
        "ws://scripted"
    }

    fn is_connected(&self) -> bool {
        *self.up.borrow()
    }

    async fn call(&self, method: &str, _params: Vec<Value>) -> Result<Value, ChainCallError> {
        if !self.is_connected() {
            return Err(ChainCallError::Disconnected);
        }
        match method {
            "getblockcount" => Ok(json!(100)),
            _ => Err(ChainCallError::Rpc {
                code: -32601,
                message: "method not found".into(),
            }),
        }
    }

    fn disconnect(&self) {
        self.up.send_replace(false);
    }

    async fn wait_for_shutdown(&self) {
        let mut rx = self.up.subscribe();
        let _ = rx.wait_for(|up| !*up).await;
    }
}

/// What a single dial does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fail,
    RejectAuth,
    Connect,
    /// Never completes.
    Hang,
}

/// Chain transport that follows a script, repeating `then` once it runs out.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    then: Step,
    attempts: AtomicU64,
    next_id: AtomicU64,
    clients: Mutex<Vec<Arc<ScriptedClient>>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Step>, then: Step) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            then,
            attempts: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
            clients: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn client(&self, index: usize) -> Option<Arc<ScriptedClient>> {
        self.clients.lock().get(index).cloned()
    }
}

#[async_trait]
impl ChainTransport for ScriptedTransport {
    async fn dial(
        &self,
        address: &str,
        _credentials: &ChainCredentials,
    ) -> Result<Arc<dyn ChainClient>, DialError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front().unwrap_or(self.then);

        match step {
            Step::Fail => Err(DialError::Connect {
                address: address.to_string(),
                reason: "connection refused".into(),
            }),
            Step::RejectAuth => Err(DialError::Auth("invalid credentials".into())),
            Step::Connect => {
                let client = Arc::new(ScriptedClient::new(self.next_id.fetch_add(1, Ordering::SeqCst)));
                self.clients.lock().push(client.clone());
                Ok(client)
            }
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Poll `condition` until it holds, panicking after `timeout`.
pub async fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let result = tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not met within {:?}", timeout);
}

/// Run `fut` with a deadline, panicking if it is missed.
pub async fn within<F: Future>(timeout: Duration, fut: F) -> F::Output {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| panic!("did not complete within {:?}", timeout))
}

/// An address on loopback nobody is listening on right now.
pub fn free_local_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}
