//! Frame buffers and borrowed frame views.
//!
//! A [`FrameBuffer`] owns a growable `bytes::BytesMut` that survives being
//! emptied, so the same allocation can carry many frames in turn. The
//! producer refills it with [`FrameBuffer::fill`]; the consumer reads it
//! through [`FrameBuffer::data`] and hands it back to the pool.
//!
//! # Example
//!
//! ```
//! use airplay_relay::frame::{FrameBuffer, FrameType, VideoFrame};
//!
//! let mut buf = FrameBuffer::new();
//! buf.fill(&VideoFrame::new(b"\x00\x00\x00\x01", 90_000, FrameType::Idr));
//!
//! assert_eq!(buf.len(), 4);
//! assert_eq!(buf.frame_type(), FrameType::Idr);
//! ```

use bytes::BytesMut;

/// Kind of H.264 payload carried by a video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    /// Codec configuration (SPS/PPS).
    Config,
    /// Instantaneous decoder refresh.
    Idr,
    /// Any other slice.
    #[default]
    NonIdr,
    /// Forward-compatible: unrecognized type value.
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            0 => FrameType::Config,
            1 => FrameType::Idr,
            2 => FrameType::NonIdr,
            other => FrameType::Unknown(other),
        }
    }
}

/// A decoded video frame as delivered by the protocol session.
///
/// Borrows the session's memory; the relay copies it into a pooled buffer.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    /// Frame payload.
    pub data: &'a [u8],
    /// Presentation timestamp in session clock units.
    pub pts: u64,
    /// Payload kind.
    pub frame_type: FrameType,
}

impl<'a> VideoFrame<'a> {
    /// Create a borrowed video frame.
    pub fn new(data: &'a [u8], pts: u64, frame_type: FrameType) -> Self {
        Self {
            data,
            pts,
            frame_type,
        }
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A decoded audio frame. Accepted from the session and discarded.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    /// Frame payload.
    pub data: &'a [u8],
    /// Presentation timestamp in session clock units.
    pub pts: u64,
}

impl<'a> AudioFrame<'a> {
    /// Create a borrowed audio frame.
    pub fn new(data: &'a [u8], pts: u64) -> Self {
        Self { data, pts }
    }
}

/// A recyclable frame buffer.
///
/// `len()` is the logical length of the current frame; the underlying
/// allocation is kept across refills.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: BytesMut,
    pts: u64,
    frame_type: FrameType,
}

impl FrameBuffer {
    /// Create an empty buffer with no allocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with `frame`.
    ///
    /// The logical length is reset to zero before the payload is appended,
    /// so existing capacity is reused.
    pub fn fill(&mut self, frame: &VideoFrame<'_>) {
        self.data.clear();
        self.data.extend_from_slice(frame.data);
        self.pts = frame.pts;
        self.frame_type = frame.frame_type;
    }

    /// Reset the logical length to zero, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.pts = 0;
        self.frame_type = FrameType::default();
    }

    /// Frame payload.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Logical length of the current frame.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Presentation timestamp of the current frame.
    #[inline]
    pub fn pts(&self) -> u64 {
        self.pts
    }

    /// Payload kind of the current frame.
    #[inline]
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Address of the backing storage. Stable across refills that fit the
    /// existing capacity.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Copy as much of the frame as fits into `dest`.
    ///
    /// Returns the number of bytes written: `min(dest.len(), self.len())`.
    pub fn copy_to(&self, dest: &mut [u8]) -> usize {
        let n = dest.len().min(self.data.len());
        dest[..n].copy_from_slice(&self.data[..n]);
        n
    }
}
