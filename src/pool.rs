//! Frame buffer pool for allocation-free steady state.
//!
//! Emptied buffers travel back from the consumer on the `recycled` queue and
//! are handed to the producer again before anything new is allocated. After
//! warmup no per-frame allocation happens as long as frames fit the
//! capacity already grown by earlier ones.
//!
//! # Usage
//!
//! ```
//! use airplay_relay::pool::BufferPool;
//!
//! let pool = BufferPool::new(4);
//! let buf = pool.acquire();
//! let addr = buf.as_ptr();
//! pool.release(buf);
//!
//! assert_eq!(pool.acquire().as_ptr(), addr);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::FrameBuffer;
use crate::queue::BoundedQueue;

/// Pool of reusable [`FrameBuffer`]s backed by the `recycled` queue.
#[derive(Debug)]
pub struct BufferPool {
    /// Buffers returned by the consumer.
    recycled: BoundedQueue<FrameBuffer>,
    /// Reserve kept in `recycled`; extra returned buffers are freed.
    max_reserve: usize,
    /// Buffers created by `acquire`.
    allocated: AtomicU64,
    /// Buffers freed by `release` because the reserve was full.
    discarded: AtomicU64,
}

impl BufferPool {
    /// Create an empty pool that keeps at most `max_reserve` spare buffers.
    pub fn new(max_reserve: usize) -> Self {
        Self {
            recycled: BoundedQueue::with_capacity(max_reserve),
            max_reserve,
            allocated: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Take a recycled buffer, or allocate a new one if none is waiting.
    ///
    /// Never blocks.
    pub fn acquire(&self) -> FrameBuffer {
        if let Some(buf) = self.recycled.try_pop() {
            return buf;
        }

        tracing::debug!("allocating new buffer");
        self.allocated.fetch_add(1, Ordering::Relaxed);
        FrameBuffer::new()
    }

    /// Return a buffer for reuse.
    ///
    /// The buffer is dropped instead when the reserve already holds
    /// `max_reserve` buffers.
    pub fn release(&self, mut buf: FrameBuffer) {
        if self.recycled.len() >= self.max_reserve {
            tracing::trace!("pool reserve full, freeing buffer");
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        buf.clear();
        self.recycled.push(buf);
    }

    /// Number of spare buffers waiting for reuse.
    #[inline]
    pub fn available(&self) -> usize {
        self.recycled.len()
    }

    /// Reserve limit.
    #[inline]
    pub fn max_reserve(&self) -> usize {
        self.max_reserve
    }

    /// Total buffers allocated over the pool's lifetime.
    #[inline]
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Total buffers freed because the reserve was full.
    #[inline]
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_BUFFERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameType, VideoFrame};

    fn filled(pool: &BufferPool, payload: &[u8]) -> FrameBuffer {
        let mut buf = pool.acquire();
        buf.fill(&VideoFrame::new(payload, 0, FrameType::NonIdr));
        buf
    }

    #[test]
    fn test_pool_creation() {
        let pool = BufferPool::new(8);
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.max_reserve(), 8);
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn test_acquire_allocates_when_empty() {
        let pool = BufferPool::new(4);
        let _a = pool.acquire();
        let _b = pool.acquire();
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn test_release_then_acquire_reuses() {
        let pool = BufferPool::new(4);
        let buf = filled(&pool, &[1u8; 1000]);
        let addr = buf.as_ptr();
        pool.release(buf);

        let again = pool.acquire();
        assert_eq!(again.as_ptr(), addr);
        assert!(again.is_empty());
        assert!(again.capacity() >= 1000);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_reuse_cycles_without_growth() {
        let pool = BufferPool::new(4);
        let first: Vec<_> = (0..3).map(|_| filled(&pool, &[0u8; 4096])).collect();
        let mut addrs: Vec<_> = first.iter().map(|b| b.as_ptr()).collect();
        addrs.sort();
        for buf in first {
            pool.release(buf);
        }

        for _ in 0..50 {
            let cycle: Vec<_> = (0..3).map(|_| filled(&pool, &[1u8; 2048])).collect();
            let mut seen: Vec<_> = cycle.iter().map(|b| b.as_ptr()).collect();
            seen.sort();
            assert_eq!(seen, addrs);
            for buf in cycle {
                pool.release(buf);
            }
        }

        assert_eq!(pool.allocated(), 3);
    }

    #[test]
    fn test_release_beyond_reserve_frees() {
        let pool = BufferPool::new(2);
        let bufs: Vec<_> = (0..3).map(|_| pool.acquire()).collect();
        for buf in bufs {
            pool.release(buf);
        }

        assert_eq!(pool.available(), 2);
        assert_eq!(pool.discarded(), 1);
    }
}
