//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! podwallet.toml (written with defaults if missing)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → command-line overrides (main.rs)
//!     → WalletConfig (validated, immutable)
//!     → passed by value into ProcessMain, sections handed to subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no global copy
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_init_config, save_config, ConfigError};
pub use schema::WalletConfig;
pub use schema::{
    BackoffConfig, ChainConfig, ExperimentalRpcConfig, LegacyRpcConfig, LogFormat,
    ObservabilityConfig, RpcConfig, ShutdownConfig, WalletStoreConfig,
};
pub use validation::{validate_config, ValidationError};
