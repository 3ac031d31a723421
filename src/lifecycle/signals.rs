//! OS signal handling.
//!
//! SIGINT and SIGTERM both translate into a shutdown request. The listener
//! task exits on its own once shutdown has been requested by any other source.

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownTrigger};

/// Spawn a task that forwards the first OS interrupt to the coordinator.
pub fn spawn_signal_listener(shutdown: ShutdownCoordinator) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signal = tokio::select! {
            name = wait_for_signal() => name,
            _ = shutdown.requested() => return,
        };

        tracing::info!(signal, "Received signal, shutting down");
        // Handlers may block briefly; keep them off the async workers.
        let coordinator = shutdown.clone();
        let pass = tokio::task::spawn_blocking(move || {
            coordinator.request_shutdown(ShutdownTrigger::Signal(signal))
        });
        if let Err(e) = pass.await {
            tracing::error!(error = %e, "Shutdown pass did not complete");
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Unable to install SIGTERM handler");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        name = ctrl_c() => name,
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Unable to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
