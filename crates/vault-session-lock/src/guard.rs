//! Non-blocking re-entrancy guard for the periodic tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Try-enter flag; never blocks.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    busy: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    /// Creates a released guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the guard, or returns `None` when it is already held.
    pub fn try_enter(&self) -> Option<GuardToken> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GuardToken {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Returns `true` while a token is alive.
    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of holding a [`ReentrancyGuard`]; releases it on drop.
#[derive(Debug)]
#[must_use = "dropping the token releases the guard immediately"]
pub struct GuardToken {
    busy: Arc<AtomicBool>,
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
