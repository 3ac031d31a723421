//! File-backed wallet storage.
//!
//! A wallet lives in `<data_dir>/wallet.json`. The file holds a salted
//! SHA-256 digest of the passphrase and the last block height the wallet
//! synchronised to; the height is written back when the wallet is closed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::chain::{ChainCallError, ChainClient};
use crate::wallet::store::{Credentials, StoreError, WalletHandle, WalletStore};

const WALLET_FILE: &str = "wallet.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalletFile {
    version: u32,
    id: Uuid,
    name: String,
    salt: String,
    passphrase_digest: String,
    synced_height: u64,
}

fn passphrase_digest(salt: &[u8], passphrase: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(passphrase.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_atomic(path: &Path, file: &WalletFile) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(file).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Wallet store rooted at a data directory.
pub struct FileWalletStore {
    data_dir: PathBuf,
    poll_interval: Duration,
    opened: Mutex<Option<Arc<FileWallet>>>,
}

impl FileWalletStore {
    pub fn new(data_dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            data_dir: data_dir.into(),
            poll_interval,
            opened: Mutex::new(None),
        }
    }

    pub fn wallet_path(&self) -> PathBuf {
        self.data_dir.join(WALLET_FILE)
    }

    pub fn exists(&self) -> bool {
        self.wallet_path().exists()
    }

    /// Create a new wallet file protected by `credentials`.
    pub fn create(&self, name: &str, credentials: &Credentials) -> Result<Uuid, StoreError> {
        let path = self.wallet_path();
        if path.exists() {
            return Err(StoreError::AlreadyExists(path));
        }
        std::fs::create_dir_all(&self.data_dir)?;

        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);

        let file = WalletFile {
            version: FORMAT_VERSION,
            id: Uuid::new_v4(),
            name: name.to_string(),
            salt: hex::encode(salt),
            passphrase_digest: passphrase_digest(&salt, credentials.passphrase()),
            synced_height: 0,
        };
        write_atomic(&path, &file)?;

        tracing::info!(wallet = %file.name, id = %file.id, path = ?path, "Created wallet");
        Ok(file.id)
    }
}

#[async_trait]
impl WalletStore for FileWalletStore {
    async fn open(&self, credentials: &Credentials) -> Result<Arc<dyn WalletHandle>, StoreError> {
        let path = self.wallet_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path));
            }
            Err(e) => return Err(e.into()),
        };

        let file: WalletFile =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if file.version != FORMAT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported format version {}",
                file.version
            )));
        }
        let salt = hex::decode(&file.salt).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if passphrase_digest(&salt, credentials.passphrase()) != file.passphrase_digest {
            return Err(StoreError::InvalidPassphrase);
        }

        tracing::info!(
            wallet = %file.name,
            synced_height = file.synced_height,
            "Opened wallet"
        );

        let wallet = Arc::new(FileWallet::new(path, file, self.poll_interval));
        *self.opened.lock() = Some(wallet.clone());
        Ok(wallet)
    }

    fn close(&self, wallet: &Arc<dyn WalletHandle>) -> Result<(), StoreError> {
        let opened = {
            let mut slot = self.opened.lock();
            match slot.as_ref() {
                Some(w) if std::ptr::addr_eq(Arc::as_ptr(w), Arc::as_ptr(wallet)) => slot.take(),
                _ => None,
            }
        };
        let Some(opened) = opened else {
            return Err(StoreError::Corrupt(format!(
                "wallet '{}' was not opened by this store",
                wallet.name()
            )));
        };

        opened.shutdown();
        opened.persist()?;
        tracing::info!(wallet = %opened.name(), "Closed wallet");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SyncProgress {
    synced: AtomicBool,
    height: AtomicU64,
}

/// A wallet opened from disk.
pub struct FileWallet {
    path: PathBuf,
    header: WalletFile,
    progress: Arc<SyncProgress>,
    closed: AtomicBool,
    chain: Mutex<Option<Arc<dyn ChainClient>>>,
    bookkeeping: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
}

impl FileWallet {
    fn new(path: PathBuf, header: WalletFile, poll_interval: Duration) -> Self {
        let progress = Arc::new(SyncProgress::default());
        progress.height.store(header.synced_height, Ordering::SeqCst);
        Self {
            path,
            header,
            progress,
            closed: AtomicBool::new(false),
            chain: Mutex::new(None),
            bookkeeping: Mutex::new(None),
            poll_interval,
        }
    }

    pub fn id(&self) -> Uuid {
        self.header.id
    }

    fn abort_bookkeeping(&self) {
        if let Some(task) = self.bookkeeping.lock().take() {
            task.abort();
        }
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.abort_bookkeeping();
        self.chain.lock().take();
        self.progress.synced.store(false, Ordering::SeqCst);
    }

    fn persist(&self) -> Result<(), StoreError> {
        let mut file = self.header.clone();
        file.synced_height = self.progress.height.load(Ordering::SeqCst);
        write_atomic(&self.path, &file)
    }
}

impl WalletHandle for FileWallet {
    fn name(&self) -> &str {
        &self.header.name
    }

    fn mark_synchronized(&self, synced: bool) {
        self.progress.synced.store(synced, Ordering::SeqCst);
    }

    fn is_synchronized(&self) -> bool {
        self.progress.synced.load(Ordering::SeqCst)
    }

    fn synced_height(&self) -> u64 {
        self.progress.height.load(Ordering::SeqCst)
    }

    fn synchronize_with(&self, client: Arc<dyn ChainClient>) {
        {
            let mut chain = self.chain.lock();
            let already_attached = chain.as_ref().is_some_and(|c| c.id() == client.id());
            if already_attached && self.bookkeeping.lock().is_some() {
                return;
            }
            tracing::info!(wallet = %self.name(), session = client.id(), "Synchronizing wallet with chain server");
            *chain = Some(client);
        }
        self.abort_bookkeeping();
        self.start_sync_bookkeeping();
    }

    fn stop_sync_bookkeeping(&self) {
        self.abort_bookkeeping();
        self.chain.lock().take();
    }

    fn start_sync_bookkeeping(&self) {
        if self.is_shutting_down() {
            return;
        }
        let Some(client) = self.chain.lock().clone() else {
            tracing::debug!(wallet = %self.name(), "No chain session attached, sync bookkeeping idle");
            return;
        };

        let mut bookkeeping = self.bookkeeping.lock();
        if bookkeeping.is_some() {
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "No async runtime, sync bookkeeping not started");
                return;
            }
        };

        let progress = self.progress.clone();
        let interval = self.poll_interval;
        *bookkeeping = Some(runtime.spawn(track_chain_tip(client, progress, interval)));
    }

    fn is_shutting_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn track_chain_tip(client: Arc<dyn ChainClient>, progress: Arc<SyncProgress>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if !client.is_connected() {
            progress.synced.store(false, Ordering::SeqCst);
            break;
        }

        match client.call("getblockcount", Vec::new()).await {
            Ok(value) => match value.as_u64() {
                Some(height) => {
                    progress.height.store(height, Ordering::SeqCst);
                    if !progress.synced.swap(true, Ordering::SeqCst) {
                        tracing::info!(height, "Wallet synchronized to chain tip");
                    }
                }
                None => tracing::warn!(%value, "Unexpected getblockcount result"),
            },
            Err(ChainCallError::Disconnected) => {
                progress.synced.store(false, Ordering::SeqCst);
                break;
            }
            Err(e) => {
                progress.synced.store(false, Ordering::SeqCst);
                tracing::debug!(error = %e, "Block count query failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    struct FixedTip(u64);

    #[async_trait]
    impl ChainClient for FixedTip {
        fn id(&self) -> u64 {
            7
        }
        fn address(&self) -> &str {
            "stub"
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn call(&self, _method: &str, _params: Vec<Value>) -> Result<Value, ChainCallError> {
            Ok(json!(self.0))
        }
        fn disconnect(&self) {}
        async fn wait_for_shutdown(&self) {
            std::future::pending::<()>().await
        }
    }

    fn store(dir: &Path) -> FileWalletStore {
        FileWalletStore::new(dir, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn create_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create("main", &Credentials::new("secret")).unwrap();

        let wallet = store.open(&Credentials::new("secret")).await.unwrap();
        assert_eq!(wallet.name(), "main");
        assert_eq!(wallet.synced_height(), 0);
        assert!(!wallet.is_synchronized());
    }

    #[tokio::test]
    async fn wrong_passphrase_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create("main", &Credentials::new("secret")).unwrap();

        let err = store.open(&Credentials::new("guess")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPassphrase));
    }

    #[tokio::test]
    async fn missing_wallet_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path()).open(&Credentials::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create("main", &Credentials::new("a")).unwrap();
        let err = store.create("main", &Credentials::new("b")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn close_persists_synced_height() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create("main", &Credentials::new("secret")).unwrap();

        let wallet = store.open(&Credentials::new("secret")).await.unwrap();
        wallet.synchronize_with(Arc::new(FixedTip(42)));

        for _ in 0..100 {
            if wallet.is_synchronized() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(wallet.is_synchronized());
        assert_eq!(wallet.synced_height(), 42);

        store.close(&wallet).unwrap();
        assert!(wallet.is_shutting_down());

        let reopened = store.open(&Credentials::new("secret")).await.unwrap();
        assert_eq!(reopened.synced_height(), 42);
    }

    #[tokio::test]
    async fn stop_detaches_chain_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create("main", &Credentials::new("secret")).unwrap();
        let wallet = store.open(&Credentials::new("secret")).await.unwrap();

        wallet.synchronize_with(Arc::new(FixedTip(5)));
        wallet.stop_sync_bookkeeping();
        wallet.mark_synchronized(false);
        wallet.start_sync_bookkeeping();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!wallet.is_synchronized());
    }
}
