//! Cooperative cancellation for the consumer side.
//!
//! The host calls `cancel()` from its unlock path while the consumer may be
//! blocked in a timed wait. The flag is polled between waits; queues
//! registered with [`CancellationToken::register`] are also interrupted so the
//! blocked wait returns right away instead of at the end of its slice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::queue::Interrupt;

/// Cancel flag with reset, shared by reference between host and consumer.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    waiters: Mutex<Vec<Weak<dyn Interrupt>>>,
}

impl CancellationToken {
    /// Create an armed (not cancelled) token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake `target` whenever this token is cancelled.
    pub fn register(&self, target: Weak<dyn Interrupt>) {
        let mut waiters = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
        waiters.retain(|w| w.strong_count() > 0);
        waiters.push(target);
    }

    /// Set the cancelled state and wake registered waiters. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);

        let targets: Vec<Arc<dyn Interrupt>> = {
            let waiters = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
            waiters.iter().filter_map(Weak::upgrade).collect()
        };
        for target in targets {
            target.interrupt();
        }
    }

    /// Clear the cancelled state. Idempotent.
    ///
    /// Only call when no consumer is blocked on this token.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    /// Non-blocking query.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
