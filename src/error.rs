//! Error types for airplay-relay.

use thiserror::Error;

/// Main error type for source lifecycle and configuration.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The protocol session could not be initialized or started.
    #[error("Failed to init session: {0}")]
    SessionInit(String),

    /// Service discovery registration failed.
    #[error("Failed to init discovery: {0}")]
    Discovery(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON deserialization error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `start()` called on a source that is already running.
    #[error("Source already started")]
    AlreadyStarted,

    /// Operation requires a running source.
    #[error("Source not started")]
    NotStarted,
}

/// Result type alias using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Returned by [`FrameRelay::take_frame`](crate::FrameRelay::take_frame)
/// when cancellation was observed before a frame became available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Flushing")]
pub struct Flushing;

/// Non-success outcomes of filling a host buffer.
///
/// `Flushing` and `Eos` are flow-control signals, not failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// Unlock was requested; the host should stop pulling.
    #[error("Flushing")]
    Flushing,

    /// An empty frame was received.
    #[error("End of stream")]
    Eos,

    /// Genuine read failure.
    #[error("Read error: {0}")]
    Error(String),
}

impl From<Flushing> for FlowError {
    fn from(_: Flushing) -> Self {
        FlowError::Flushing
    }
}
