//! Metrics collection and exposition.
//!
//! # Metrics
//! - `podwallet_shutdown_handlers_total` (counter): handlers run, by outcome
//! - `podwallet_wallet_loaded` (gauge): 1 while a wallet is loaded
//! - `podwallet_chain_dial_attempts_total` (counter): dials, by outcome
//! - `podwallet_chain_connected` (gauge): 1 while a chain session is up
//! - `podwallet_rpc_requests_total` (counter): by server, method and outcome

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}

fn flag(on: bool) -> f64 {
    if on { 1.0 } else { 0.0 }
}

pub fn record_shutdown_handler(ok: bool) {
    metrics::counter!("podwallet_shutdown_handlers_total", "outcome" => outcome(ok)).increment(1);
}

pub fn set_wallet_loaded(loaded: bool) {
    metrics::gauge!("podwallet_wallet_loaded").set(flag(loaded));
}

/// `outcome` is one of `connected`, `failed` or `auth_failed`.
pub fn record_dial_attempt(outcome: &'static str) {
    metrics::counter!("podwallet_chain_dial_attempts_total", "outcome" => outcome).increment(1);
}

pub fn set_chain_connected(connected: bool) {
    metrics::gauge!("podwallet_chain_connected").set(flag(connected));
}

/// `method` must come from a fixed set; forwarded chain calls are recorded
/// as `passthrough`.
pub fn record_rpc_request(server: &'static str, method: &'static str, ok: bool) {
    metrics::counter!(
        "podwallet_rpc_requests_total",
        "server" => server,
        "method" => method,
        "outcome" => outcome(ok)
    )
    .increment(1);
}
