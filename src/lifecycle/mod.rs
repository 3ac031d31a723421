//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     signals → WalletLoader → ServiceBridge → initial load → ChainSyncSession
//!
//! Shutdown (shutdown.rs):
//!     SIGINT/SIGTERM, RPC stop, fatal error
//!         → ShutdownCoordinator::request_shutdown (first caller wins)
//!         → handlers in reverse registration order
//!         → Stopped → ProcessMain drains listeners and exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Cleanup actions are plain closures; subsystems never share a trait
//! - One failing handler never prevents the rest from running
//! - Draining after the pass is bounded by `shutdown.drain_timeout_secs`

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{ShutdownCoordinator, ShutdownState, ShutdownTrigger};
pub use signals::spawn_signal_listener;
pub use startup::{ExitStatus, ProcessMain};
