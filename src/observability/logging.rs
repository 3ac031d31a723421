//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Turn the configured level and per-subsystem levels into a filter
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - `RUST_LOG`, when set, replaces the configured filter entirely

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Filter directives derived from config, e.g. `info,podwallet::chain=debug`.
pub fn filter_directives(config: &ObservabilityConfig) -> String {
    let mut directives = vec![config.log_level.clone()];
    for (subsystem, level) in &config.subsystems {
        directives.push(format!("{}::{}={}", env!("CARGO_CRATE_NAME"), subsystem, level));
    }
    directives.join(",")
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logging already initialised");
    }
}
