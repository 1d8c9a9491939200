//! Cooperative cancellation for requests and background loops.
//!
//! All artificial waits in the engine (recovery delays, fallback pacing,
//! retry backoff) go through a [`Cancellation`] handle so a caller can abort
//! execution deterministically instead of relying on internal timers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use taskmesh_core::{EngineError, EngineResult};

/// Cloneable cancellation handle.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    /// Create a fresh, un-cancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger cancellation. Wakes every pending wait.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
        self.inner.notify.notify_waiters();
    }

    /// Check whether cancellation has been triggered.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Fail fast when already cancelled.
    pub fn ensure_active(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Resolve once cancellation is triggered.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // A `Notified` future only becomes a waiter once polled or enabled;
        // the waiter must be registered before the final flag check or a
        // `cancel()` landing in between is never observed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Cancelled` when cancellation wins the race.
    pub async fn sleep(&self, duration: Duration) -> EngineResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled() => Err(EngineError::Cancelled),
        }
    }
}
