//! RPC subsystem.
//!
//! # Data Flow
//! ```text
//! ProcessMain
//!     → bridge.rs (bind listeners, register the "rpc" stop handler)
//!         → legacy.rs       POST /          JSON-RPC: stop, walletstatus, chain passthrough
//!         → experimental.rs /v1/*           REST: status, wallet load/unload, stop
//!         → auth.rs         bearer token check for both
//!
//! ChainSyncSession association → ServiceBridge::set_chain_server
//! `stop` request → ShutdownCoordinator::request_shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners come up before any wallet or chain session exists
//! - Handlers never run the shutdown pass on an async worker
//! - Each listener drains in-flight requests when stopped

pub mod auth;
pub mod bridge;
pub mod experimental;
pub mod legacy;
pub mod types;

pub use bridge::{BridgeError, RpcState, ServiceBridge};
pub use types::{codes, RpcErrorObject, RpcRequest, RpcResponse, StatusReport};
