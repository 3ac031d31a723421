//! Wallet to chain-session association slot.
//!
//! Holds the closure that wires a newly available wallet to the current
//! chain session. The slot is read under its lock but the closure is always
//! invoked after the lock is released, so the closure may call back into
//! the session freely.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::wallet::WalletHandle;

type AssociateFn = Arc<dyn Fn(Arc<dyn WalletHandle>) + Send + Sync>;

/// Mutex-guarded optional association closure.
#[derive(Clone, Default)]
pub struct Association {
    slot: Arc<Mutex<Option<AssociateFn>>>,
}

impl Association {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the association closure.
    pub fn set<F>(&self, associate: F)
    where
        F: Fn(Arc<dyn WalletHandle>) + Send + Sync + 'static,
    {
        *self.slot.lock() = Some(Arc::new(associate));
    }

    /// Remove the closure; later invocations become no-ops.
    pub fn clear(&self) {
        self.slot.lock().take();
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Invoke the closure if one is set. Returns whether it ran.
    pub fn invoke_if_present(&self, wallet: Arc<dyn WalletHandle>) -> bool {
        let associate = self.slot.lock().clone();
        match associate {
            Some(associate) => {
                associate(wallet);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Association {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Association").field("set", &self.is_set()).finish()
    }
}
