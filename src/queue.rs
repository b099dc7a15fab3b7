//! Bounded transfer queue between the producer and consumer threads.
//!
//! A FIFO guarded by a `Mutex` with a `Condvar` for the blocking side.
//! The bound is a policy decision made by the caller from [`BoundedQueue::len`];
//! `push` itself never blocks and never fails.
//!
//! # Architecture
//!
//! ```text
//! session thread ─► filled   ─► consumer thread
//! session thread ◄─ recycled ◄─ consumer thread
//! ```
//!
//! The relay uses two instances: `filled` carries frames forward, `recycled`
//! carries emptied buffers back for reuse.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Longest single condvar wait when the caller's deadline is unrepresentable.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(3600);

/// Something blocked waiters can be woken from.
///
/// Registered with a [`CancellationToken`](crate::cancel::CancellationToken)
/// so that cancelling wakes consumers immediately.
pub trait Interrupt: Send + Sync {
    /// Wake every thread blocked in a timed wait.
    fn interrupt(&self);
}

struct State<T> {
    items: VecDeque<T>,
    /// Bumped by `interrupt()`; a waiter that sees it change gives up.
    epoch: u64,
}

/// Thread-safe FIFO with timed blocking pop.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty queue with room for `capacity` items before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                epoch: 0,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Queue state is a plain VecDeque; it stays consistent after a panic.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an item and wake one waiting popper.
    pub fn push(&self, item: T) {
        self.lock().items.push_back(item);
        self.available.notify_one();
    }

    /// Pop the front item without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Pop the front item, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or when [`Interrupt::interrupt`] is called
    /// while waiting. A timeout too large to represent as an `Instant` waits
    /// until an item arrives or the queue is interrupted.
    pub fn pop_wait(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock();
        let epoch = state.epoch;

        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.epoch != epoch {
                return None;
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    deadline - now
                }
                None => MAX_WAIT_SLICE,
            };

            state = match self.available.wait_timeout(state, wait) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
    }

    /// Current number of queued items.
    ///
    /// Advisory: the other side may change it right after this returns.
    #[inline]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every queued item.
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }
}

impl<T: Send> Interrupt for BoundedQueue<T> {
    fn interrupt(&self) {
        {
            let mut state = self.lock();
            state.epoch = state.epoch.wrapping_add(1);
        }
        self.available.notify_all();
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .finish()
    }
}
