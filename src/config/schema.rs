//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the wallet
//! process. All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the wallet process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WalletConfig {
    /// Wallet storage and initial load.
    pub wallet: WalletStoreConfig,

    /// Chain server connection.
    pub chain: ChainConfig,

    /// RPC listeners.
    pub rpc: RpcConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,
}

/// Wallet storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WalletStoreConfig {
    /// Directory holding `wallet.json`.
    pub data_dir: PathBuf,

    /// Passphrase used for the initial load (and for `--create`).
    pub passphrase: Option<String>,

    /// Name given to a newly created wallet.
    pub name: String,

    /// Skip loading the wallet at startup; load later over RPC.
    pub no_initial_load: bool,

    /// How often sync bookkeeping polls the chain tip, in seconds.
    pub sync_poll_interval_secs: u64,
}

impl Default for WalletStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            passphrase: None,
            name: "default".to_string(),
            no_initial_load: false,
            sync_poll_interval_secs: 10,
        }
    }
}

impl WalletStoreConfig {
    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync_poll_interval_secs)
    }
}

/// Chain server connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// WebSocket endpoint of the chain server.
    pub address: String,

    /// RPC username.
    pub username: String,

    /// RPC password.
    pub password: String,

    /// Dial timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Per-call timeout in seconds.
    pub request_timeout_secs: u64,

    /// Treat rejected credentials as fatal instead of retrying.
    pub auth_failure_fatal: bool,

    /// Delay between failed dial attempts.
    pub backoff: BackoffConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            address: "ws://127.0.0.1:11048/ws".to_string(),
            username: String::new(),
            password: String::new(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            auth_failure_fatal: false,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ChainConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// When false, failed dials are retried immediately.
    pub enabled: bool,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 250,
            max_delay_ms: 30_000,
        }
    }
}

/// RPC listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Legacy JSON-RPC listener.
    pub legacy: LegacyRpcConfig,

    /// Optional REST listener.
    pub experimental: ExperimentalRpcConfig,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            legacy: LegacyRpcConfig::default(),
            experimental: ExperimentalRpcConfig::default(),
            request_timeout_secs: 30,
            max_body_size: 1024 * 1024,
        }
    }
}

/// Legacy JSON-RPC listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LegacyRpcConfig {
    /// Bind address (e.g., "127.0.0.1:11046").
    pub bind_address: String,

    /// Bearer token required on every request, if set.
    pub auth_token: Option<String>,

    /// Maximum concurrent requests.
    pub max_clients: usize,
}

impl Default for LegacyRpcConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:11046".to_string(),
            auth_token: None,
            max_clients: 10,
        }
    }
}

/// REST listener with wallet load/unload.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExperimentalRpcConfig {
    /// Enable the listener.
    pub enabled: bool,

    /// Bind address.
    pub bind_address: String,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for ExperimentalRpcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:11045".to_string(),
            api_key: String::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Per-subsystem log levels, e.g. `chain = "debug"`.
    pub subsystems: BTreeMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
            subsystems: BTreeMap::new(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long listeners and background tasks get to finish, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 5,
        }
    }
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
