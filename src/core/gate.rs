//! Process-wide run admission.
//!
//! Only one routine run may be active at a time. Callers that must run
//! wait their turn; the scheduler instead coalesces, keeping at most one
//! fire pending behind an active run.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard};

/// Guard held for the duration of a run
pub type RunPermit<'a> = MutexGuard<'a, ()>;

#[derive(Debug, Default)]
pub struct RunGate {
    active: Mutex<()>,
    waiting: AtomicBool,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no run is active
    pub async fn enter(&self) -> RunPermit<'_> {
        self.active.lock().await
    }

    /// Enter immediately, or wait as the single pending entrant.
    ///
    /// Returns `None` when a run is active and another caller is already
    /// waiting behind it.
    pub async fn enter_or_coalesce(&self) -> Option<RunPermit<'_>> {
        if let Ok(permit) = self.active.try_lock() {
            return Some(permit);
        }

        if self.waiting.swap(true, Ordering::AcqRel) {
            return None;
        }

        // Frees the pending slot on admission and on cancellation alike
        let _slot = PendingSlot(&self.waiting);
        Some(self.active.lock().await)
    }

    /// Check if a run currently holds the gate
    pub fn is_active(&self) -> bool {
        self.active.try_lock().is_err()
    }

    /// Check if a caller is queued behind the active run
    pub fn has_pending(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }
}

/// Clears the pending flag when dropped
struct PendingSlot<'a>(&'a AtomicBool);

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
