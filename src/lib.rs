//! # airplay-relay
//!
//! Frame relay for a live AirPlay video source.
//!
//! A protocol session pushes decoded H.264 frames from its own thread; a
//! pull-driven host asks for them one at a time at its own pace. This crate
//! sits in between.
//!
//! ## Architecture
//!
//! - **Producer** (session thread): `submit_frame` never blocks; frames are
//!   dropped once `max_buffers` are waiting
//! - **Consumer** (host thread): `take_frame` blocks in bounded slices and
//!   returns `Flushing` when unlock is requested
//! - **Recycling**: consumed buffers travel back to the producer for reuse
//!
//! ## Example
//!
//! ```ignore
//! use airplay_relay::AirPlaySource;
//!
//! let source = AirPlaySource::builder()
//!     .session_backend(backend)
//!     .discovery(mdns)
//!     .build()?;
//!
//! source.start()?;
//! let mut dest = vec![0u8; source.blocksize()];
//! loop {
//!     match source.fill_next_output(&mut dest) {
//!         Ok(n) => push_downstream(&dest[..n]),
//!         Err(_) => break,
//!     }
//! }
//! source.stop();
//! ```

pub mod backpressure;
pub mod cancel;
pub mod config;
pub mod error;
pub mod frame;
pub mod pool;
pub mod queue;
pub mod relay;
pub mod session;
pub mod watcher;

mod source;

pub use config::SourceConfig;
pub use error::{FlowError, Flushing, RelayError};
pub use frame::{FrameBuffer, FrameType};
pub use relay::{FrameRelay, RelayStats};
pub use source::{AirPlaySource, ElementMetadata, Format, SourceBuilder, ELEMENT_METADATA};
