//! Frame relay between the session thread and the pull-driven consumer.
//!
//! # Architecture
//!
//! ```text
//!                   ┌──────── filled ────────┐
//! submit_frame ───► │ FrameBuffer ... Buffer │ ───► take_frame
//!      ▲            └────────────────────────┘          │
//!      │            ┌─────── recycled ───────┐          ▼
//!   acquire ◄────── │ FrameBuffer ... Buffer │ ◄──── release
//!                   └────────────────────────┘
//! ```
//!
//! The producer never blocks: when `max_buffers` frames are already waiting
//! the incoming frame is dropped. The consumer blocks in bounded slices and
//! checks the cancellation token between them.
//!
//! Frames come out in submission order, with gaps where frames were dropped.
//! There is no gap marker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::backpressure::AdmissionGate;
use crate::cancel::CancellationToken;
use crate::config::DEFAULT_MAX_BUFFERS;
use crate::error::Flushing;
use crate::frame::{AudioFrame, FrameBuffer, VideoFrame};
use crate::pool::BufferPool;
use crate::queue::{BoundedQueue, Interrupt};

/// Counter snapshot for a relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Video frames offered by the producer.
    pub submitted: u64,
    /// Video frames dropped by the admission check.
    pub dropped: u64,
    /// Frames handed to the consumer.
    pub delivered: u64,
    /// Buffers allocated by the pool.
    pub allocated: u64,
    /// Returned buffers freed because the pool reserve was full.
    pub discarded_buffers: u64,
    /// Copies clamped to an undersized destination.
    pub truncated: u64,
    /// Audio frames received and ignored.
    pub audio_discarded: u64,
}

/// Bounded, buffer-recycling, cancellable SPSC frame relay.
///
/// Share it as `Arc<FrameRelay>`: the producer calls [`submit_frame`](Self::submit_frame),
/// the consumer calls [`take_frame`](Self::take_frame) and then
/// [`release`](Self::release) once the bytes are copied out.
#[derive(Debug)]
pub struct FrameRelay {
    filled: Arc<BoundedQueue<FrameBuffer>>,
    pool: BufferPool,
    gate: AdmissionGate,
    cancel: CancellationToken,
    submitted: AtomicU64,
    delivered: AtomicU64,
    truncated: AtomicU64,
    audio_discarded: AtomicU64,
}

impl FrameRelay {
    /// Create a relay admitting up to `max_buffers` waiting frames.
    pub fn new(max_buffers: usize) -> Self {
        let filled = Arc::new(BoundedQueue::with_capacity(max_buffers));
        let cancel = CancellationToken::new();
        let target: Arc<dyn Interrupt> = filled.clone();
        cancel.register(Arc::downgrade(&target));

        Self {
            filled,
            pool: BufferPool::new(max_buffers),
            gate: AdmissionGate::new(max_buffers),
            cancel,
            submitted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            truncated: AtomicU64::new(0),
            audio_discarded: AtomicU64::new(0),
        }
    }

    /// Queue a copy of `frame` for the consumer, or drop it if too many
    /// frames are already waiting.
    ///
    /// Producer thread only. Never blocks. Returns `true` if queued.
    pub fn submit_frame(&self, frame: &VideoFrame<'_>) -> bool {
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let waiting = self.filled.len();
        tracing::trace!(waiting, len = frame.len(), "incoming frame");

        if !self.gate.admit(waiting) {
            return false;
        }

        let mut buf = self.pool.acquire();
        buf.fill(frame);
        self.filled.push(buf);
        true
    }

    /// Accept an audio frame. There is no audio path; it is discarded.
    pub fn discard_audio(&self, frame: &AudioFrame<'_>) {
        self.audio_discarded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(len = frame.data.len(), "discarding audio frame");
    }

    /// Wait for the next frame, polling cancellation every `timeout`.
    ///
    /// Consumer thread only. Returns `Err(Flushing)` without consuming a
    /// frame once the token is cancelled. The caller must hand the buffer
    /// back with [`release`](Self::release).
    pub fn take_frame(&self, timeout: Duration) -> std::result::Result<FrameBuffer, Flushing> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Flushing);
            }
            if let Some(buf) = self.filled.pop_wait(timeout) {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                return Ok(buf);
            }
        }
    }

    /// Pop the next frame if one is waiting.
    pub fn try_take_frame(&self) -> Option<FrameBuffer> {
        let buf = self.filled.try_pop()?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Some(buf)
    }

    /// Return a consumed buffer to the pool.
    pub fn release(&self, buf: FrameBuffer) {
        self.pool.release(buf);
    }

    /// Copy the frame into `dest`, clamping to its length.
    ///
    /// Returns the bytes written. A clamped copy is counted and reported at
    /// warn level; the tail of the frame is lost.
    pub fn copy_out(&self, buf: &FrameBuffer, dest: &mut [u8]) -> usize {
        if dest.len() < buf.len() {
            self.truncated.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                dest = dest.len(),
                frame = buf.len(),
                "destination buffer too small, truncating frame"
            );
        }
        buf.copy_to(dest)
    }

    /// Move every waiting frame back to the pool.
    ///
    /// Returns the number of frames discarded.
    pub fn drain(&self) -> usize {
        let stale = self.filled.drain();
        let n = stale.len();
        for buf in stale {
            self.pool.release(buf);
        }
        n
    }

    /// Cancel any current or future `take_frame` until [`reset_cancel`](Self::reset_cancel).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clear cancellation. Only when no consumer is blocked.
    pub fn reset_cancel(&self) {
        self.cancel.reset();
    }

    /// Check if cancellation is in effect.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Frames waiting for the consumer.
    #[inline]
    pub fn queued(&self) -> usize {
        self.filled.len()
    }

    /// Spare buffers waiting for reuse.
    #[inline]
    pub fn spare_buffers(&self) -> usize {
        self.pool.available()
    }

    /// Admission threshold.
    #[inline]
    pub fn max_buffers(&self) -> usize {
        self.gate.max_outstanding()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.gate.dropped(),
            delivered: self.delivered.load(Ordering::Relaxed),
            allocated: self.pool.allocated(),
            discarded_buffers: self.pool.discarded(),
            truncated: self.truncated.load(Ordering::Relaxed),
            audio_discarded: self.audio_discarded.load(Ordering::Relaxed),
        }
    }
}

impl Default for FrameRelay {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFERS)
    }
}
