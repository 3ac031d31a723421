//! Wallet storage collaborator interfaces.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::chain::ChainClient;

/// Secret used to open a wallet.
#[derive(Clone, Default)]
pub struct Credentials {
    passphrase: String,
}

impl Credentials {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// Errors raised by a wallet store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no wallet found at {0}")]
    NotFound(PathBuf),

    #[error("a wallet already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("invalid passphrase")]
    InvalidPassphrase,

    #[error("wallet file is corrupt: {0}")]
    Corrupt(String),

    #[error("wallet storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens and closes wallets.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Open the wallet, rejecting bad credentials.
    async fn open(&self, credentials: &Credentials) -> Result<Arc<dyn WalletHandle>, StoreError>;

    /// Release a wallet previously returned by `open`.
    fn close(&self, wallet: &Arc<dyn WalletHandle>) -> Result<(), StoreError>;
}

/// An open wallet as seen by the rest of the process.
pub trait WalletHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Set the "chain synchronised" flag.
    fn mark_synchronized(&self, synced: bool);

    fn is_synchronized(&self) -> bool;

    /// Height of the last block the wallet has caught up to.
    fn synced_height(&self) -> u64;

    /// Attach a chain session and begin syncing against it.
    fn synchronize_with(&self, client: Arc<dyn ChainClient>);

    /// Stop sync bookkeeping and detach from the current chain session.
    fn stop_sync_bookkeeping(&self);

    /// Restart sync bookkeeping against the attached session, if any.
    fn start_sync_bookkeeping(&self);

    /// True once the wallet has been closed or asked to stop.
    fn is_shutting_down(&self) -> bool;
}

impl fmt::Debug for dyn WalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("name", &self.name())
            .field("synchronized", &self.is_synchronized())
            .field("synced_height", &self.synced_height())
            .finish()
    }
}
