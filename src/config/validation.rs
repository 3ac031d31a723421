//! Configuration validation.
//!
//! Serde handles syntax; this pass checks values such as bind addresses and
//! timeouts. Every problem is reported, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::chain::ws::parse_address;
use crate::config::schema::WalletConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{}' is not a socket address", value)));
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than zero"));
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &WalletConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_nonzero(&mut errors, "wallet.sync_poll_interval_secs", config.wallet.sync_poll_interval_secs);

    if let Err(e) = parse_address(&config.chain.address) {
        errors.push(ValidationError::new("chain.address", e.to_string()));
    }
    check_nonzero(&mut errors, "chain.connect_timeout_secs", config.chain.connect_timeout_secs);
    check_nonzero(&mut errors, "chain.request_timeout_secs", config.chain.request_timeout_secs);
    let backoff = &config.chain.backoff;
    if backoff.enabled {
        check_nonzero(&mut errors, "chain.backoff.base_delay_ms", backoff.base_delay_ms);
        if backoff.base_delay_ms > backoff.max_delay_ms {
            errors.push(ValidationError::new(
                "chain.backoff.max_delay_ms",
                "must not be smaller than base_delay_ms",
            ));
        }
    }

    check_socket_addr(&mut errors, "rpc.legacy.bind_address", &config.rpc.legacy.bind_address);
    if config.rpc.legacy.max_clients == 0 {
        errors.push(ValidationError::new("rpc.legacy.max_clients", "must be greater than zero"));
    }
    if config.rpc.legacy.auth_token.as_deref() == Some("") {
        errors.push(ValidationError::new("rpc.legacy.auth_token", "must not be empty when set"));
    }
    let experimental = &config.rpc.experimental;
    if experimental.enabled {
        check_socket_addr(&mut errors, "rpc.experimental.bind_address", &experimental.bind_address);
        if experimental.api_key.is_empty() {
            errors.push(ValidationError::new(
                "rpc.experimental.api_key",
                "required when the experimental listener is enabled",
            ));
        }
    }
    check_nonzero(&mut errors, "rpc.request_timeout_secs", config.rpc.request_timeout_secs);

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    for (subsystem, level) in &observability.subsystems {
        if !LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ValidationError::new(
                format!("observability.subsystems.{}", subsystem),
                format!("unknown level '{}'", level),
            ));
        }
    }
    if observability.metrics_enabled {
        check_socket_addr(&mut errors, "observability.metrics_address", &observability.metrics_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
