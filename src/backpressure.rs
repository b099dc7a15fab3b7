//! Backpressure handling for incoming frames.
//!
//! The session thread must never wait on the consumer: stalling it can
//! desynchronize the protocol's clock and acknowledgement state. Instead,
//! once the number of frames waiting for the consumer reaches the limit,
//! new frames are dropped and counted.
//!
//! # Configuration
//!
//! - `max_outstanding`: frames allowed to wait in the `filled` queue (default: 10)

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::DEFAULT_MAX_BUFFERS;

/// Drop-if-full admission check for the producer side.
///
/// Decisions are made against a queue length that may already be stale;
/// the limit is a soft bound, not a correctness invariant.
#[derive(Debug)]
pub struct AdmissionGate {
    /// Maximum frames allowed to wait for the consumer.
    max_outstanding: usize,
    /// Frames rejected so far.
    dropped: AtomicU64,
}

impl AdmissionGate {
    /// Create a gate with the given limit.
    pub fn new(max_outstanding: usize) -> Self {
        Self {
            max_outstanding,
            dropped: AtomicU64::new(0),
        }
    }

    /// Decide whether a frame can be queued while `queued` frames wait.
    ///
    /// A rejected frame is counted and reported at warn level.
    pub fn admit(&self, queued: usize) -> bool {
        if queued < self.max_outstanding {
            return true;
        }

        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            queued,
            max = self.max_outstanding,
            "too many buffers waiting, dropping incoming frame"
        );
        false
    }

    /// Get the limit.
    #[inline]
    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    /// Frames dropped since creation.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_creation() {
        let gate = AdmissionGate::new(4);
        assert_eq!(gate.max_outstanding(), 4);
        assert_eq!(gate.dropped(), 0);
    }

    #[test]
    fn test_gate_default() {
        let gate = AdmissionGate::default();
        assert_eq!(gate.max_outstanding(), DEFAULT_MAX_BUFFERS);
    }

    #[test]
    fn test_admit_below_limit() {
        let gate = AdmissionGate::new(3);
        assert!(gate.admit(0));
        assert!(gate.admit(2));
        assert_eq!(gate.dropped(), 0);
    }

    #[test]
    fn test_admit_at_limit_drops() {
        let gate = AdmissionGate::new(3);
        assert!(!gate.admit(3));
        assert!(!gate.admit(7));
        assert_eq!(gate.dropped(), 2);
    }

    #[test]
    fn test_zero_limit_drops_everything() {
        let gate = AdmissionGate::new(0);
        assert!(!gate.admit(0));
        assert_eq!(gate.dropped(), 1);
    }
}
