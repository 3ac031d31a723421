//! Wallet process lifecycle and chain sync coordination.

// Core
pub mod chain;
pub mod wallet;

// Surfaces
pub mod rpc;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::WalletConfig;
pub use lifecycle::{ExitStatus, ProcessMain, ShutdownCoordinator};
