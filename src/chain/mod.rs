//! Chain server connectivity subsystem.
//!
//! # Data Flow
//! ```text
//! session.rs (reconnect loop)
//!     → client.rs (ChainTransport::dial, via ws.rs in production)
//!     → association.rs (closure wiring the live client to a wallet)
//!     → WalletLoader::run_after_load (wallet arrives now or later)
//!     → ChainClient::wait_for_shutdown (transport lost)
//!     → association cleared, wallet told to resync, dial again
//! ```
//!
//! # Design Decisions
//! - Dial failures are expected and retried; they never reach a caller
//! - The association closure is cleared before its client is discarded
//! - The session and the loader only meet through callbacks

pub mod association;
pub mod client;
pub mod session;
pub mod ws;

pub use association::Association;
pub use client::{ChainCallError, ChainClient, ChainCredentials, ChainTransport, DialError};
pub use session::{ChainServerHook, ChainSyncSession, SyncState};
pub use ws::{WsChainClient, WsTransport};
