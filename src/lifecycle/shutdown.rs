//! Shutdown coordination for the wallet process.
//!
//! Every trigger source (OS signal, RPC `stop`, fatal startup error) funnels
//! into [`ShutdownCoordinator::request_shutdown`]. The first caller wins and
//! runs the registered cleanup handlers in reverse registration order; every
//! later call is a no-op.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::observability::metrics;

/// Process-wide shutdown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Stopped,
}

/// The source that first asked for shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// An OS interrupt (SIGINT, SIGTERM).
    Signal(&'static str),
    /// A client asked over RPC.
    StopRequest,
    /// An unrecoverable error; the process exits non-zero.
    Fatal(String),
}

impl ShutdownTrigger {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShutdownTrigger::Fatal(_))
    }
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::Signal(name) => write!(f, "signal {}", name),
            ShutdownTrigger::StopRequest => write!(f, "stop request"),
            ShutdownTrigger::Fatal(reason) => write!(f, "fatal error: {}", reason),
        }
    }
}

type Action = Box<dyn FnOnce() -> Result<(), String> + Send + 'static>;

struct Handler {
    name: &'static str,
    action: Action,
}

struct Stack {
    state: ShutdownState,
    trigger: Option<ShutdownTrigger>,
    handlers: Vec<Handler>,
}

struct Inner {
    stack: Mutex<Stack>,
    state_tx: watch::Sender<ShutdownState>,
}

/// Coordinator for graceful shutdown.
///
/// Cheap to clone; all clones share one handler stack and one state.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl ShutdownCoordinator {
    /// Create a new coordinator in the `Running` state.
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ShutdownState::Running);
        Self {
            inner: Arc::new(Inner {
                stack: Mutex::new(Stack {
                    state: ShutdownState::Running,
                    trigger: None,
                    handlers: Vec::new(),
                }),
                state_tx,
            }),
        }
    }

    /// Register an infallible cleanup action.
    ///
    /// If shutdown has already begun the action runs immediately on the
    /// calling task instead of being queued.
    pub fn register<F>(&self, name: &'static str, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Handler {
            name,
            action: Box::new(move || {
                action();
                Ok(())
            }),
        });
    }

    /// Register a cleanup action whose failure is logged and swallowed.
    pub fn register_fallible<F, E>(&self, name: &'static str, action: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        self.push(Handler {
            name,
            action: Box::new(move || action().map_err(|e| e.to_string())),
        });
    }

    fn push(&self, handler: Handler) {
        let mut stack = self.inner.stack.lock();
        if stack.state == ShutdownState::Running {
            tracing::trace!(handler = handler.name, "Shutdown handler registered");
            stack.handlers.push(handler);
            return;
        }
        drop(stack);

        tracing::debug!(
            handler = handler.name,
            "Shutdown already in progress, running handler immediately"
        );
        run_handler(handler);
    }

    /// Request process shutdown.
    ///
    /// Returns `true` if this call performed the shutdown pass, `false` if
    /// shutdown had already been requested.
    pub fn request_shutdown(&self, trigger: ShutdownTrigger) -> bool {
        let handlers = {
            let mut stack = self.inner.stack.lock();
            if stack.state != ShutdownState::Running {
                tracing::debug!(%trigger, "Shutdown already requested, ignoring");
                return false;
            }
            stack.state = ShutdownState::ShuttingDown;
            stack.trigger = Some(trigger.clone());
            std::mem::take(&mut stack.handlers)
        };
        self.inner.state_tx.send_replace(ShutdownState::ShuttingDown);

        tracing::info!(%trigger, handlers = handlers.len(), "Shutting down");

        for handler in handlers.into_iter().rev() {
            run_handler(handler);
        }

        self.inner.stack.lock().state = ShutdownState::Stopped;
        self.inner.state_tx.send_replace(ShutdownState::Stopped);
        tracing::info!("Shutdown handlers complete");
        true
    }

    /// Current state.
    pub fn state(&self) -> ShutdownState {
        *self.inner.state_tx.borrow()
    }

    /// True once shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    /// The trigger that won, if shutdown has been requested.
    pub fn trigger(&self) -> Option<ShutdownTrigger> {
        self.inner.stack.lock().trigger.clone()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.inner.state_tx.subscribe()
    }

    /// Resolves as soon as shutdown has been requested.
    pub async fn requested(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|state| *state != ShutdownState::Running).await;
    }

    /// Resolves once every handler has run.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|state| *state == ShutdownState::Stopped).await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .finish()
    }
}

fn run_handler(handler: Handler) {
    let Handler { name, action } = handler;
    match catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(())) => {
            tracing::debug!(handler = name, "Shutdown handler finished");
            metrics::record_shutdown_handler(true);
        }
        Ok(Err(e)) => {
            tracing::error!(handler = name, error = %e, "Shutdown handler failed");
            metrics::record_shutdown_handler(false);
        }
        Err(_) => {
            tracing::error!(handler = name, "Shutdown handler panicked");
            metrics::record_shutdown_handler(false);
        }
    }
}
