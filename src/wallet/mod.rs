//! Wallet subsystem.
//!
//! # Data Flow
//! ```text
//! ProcessMain / experimental RPC
//!     → loader.rs (load / unload, post-load callbacks)
//!     → store.rs (WalletStore trait: open / close)
//!     → file.rs (wallet.json on disk, sync bookkeeping)
//!
//! ChainSyncSession / ServiceBridge
//!     → loader.run_after_load(callback)
//!     → callback(wallet) once a wallet is available
//! ```
//!
//! # Design Decisions
//! - At most one wallet is loaded at a time
//! - Post-load callbacks fire once, in registration order, outside any lock
//! - The loader registers its own unload with the shutdown coordinator

pub mod file;
pub mod loader;
pub mod store;

pub use file::{FileWallet, FileWalletStore};
pub use loader::{LoaderError, WalletLoader};
pub use store::{Credentials, StoreError, WalletHandle, WalletStore};
