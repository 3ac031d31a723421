//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Chain server dial fails:
//!     → backoff.rs (delay before the next attempt, with jitter)
//!     → reconnect loop sleeps, polling shutdown while it waits
//! ```
//!
//! # Design Decisions
//! - Dial failures are retried forever; backoff only spaces them out
//! - Jittered backoff prevents a fleet of wallets reconnecting in lockstep
//! - Backoff can be disabled to retry immediately

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
