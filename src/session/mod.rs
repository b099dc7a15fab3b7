//! Session module - the protocol session and discovery collaborators.
//!
//! The relay does not speak the AirPlay protocol itself. A
//! [`SessionBackend`] creates a [`Session`] that runs on its own thread and
//! reports decoded frames and connection edges through [`SessionCallbacks`].
//! A [`Discovery`] backend advertises the listening port on the network.
//!
//! # Lifecycle
//!
//! 1. `SessionBackend::init` with the callback target
//! 2. `Session::start` returns the listening port `p`
//! 3. `Discovery::init` with the service name and hardware address
//! 4. Advertise RAOP on `p` and AirPlay on `p + 1`
//!
//! Teardown runs in the opposite direction: the session is stopped first,
//! then both records are withdrawn.
//!
//! Provides:
//! - [`loopback`] - in-process backend driven by hand, for demos and tests

pub mod loopback;

use std::sync::Arc;

use crate::error::Result;
use crate::frame::{AudioFrame, VideoFrame};

/// Severity of a message logged by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Failure inside the session.
    Error,
    /// Recoverable problem.
    Warning,
    /// Informational.
    Info,
    /// Verbose protocol detail.
    Debug,
}

/// Callback target registered with a session.
///
/// Invoked from the session's worker thread.
pub trait SessionCallbacks: Send + Sync {
    /// A client connected. May repeat within one client session.
    fn on_connect(&self);

    /// A client disconnected. May repeat.
    fn on_disconnect(&self);

    /// A decoded video frame. The data is only valid during the call.
    fn on_video_frame(&self, frame: VideoFrame<'_>);

    /// A decoded audio frame. The data is only valid during the call.
    fn on_audio_frame(&self, frame: AudioFrame<'_>);

    /// A log line from the session.
    fn on_log(&self, _level: LogLevel, _message: &str) {}
}

/// A running (or startable) protocol session.
pub trait Session: Send {
    /// Begin accepting clients. Returns the listening port.
    fn start(&mut self) -> Result<u16>;

    /// Stop the session.
    ///
    /// Must not return while a callback is still executing, and no callback
    /// may fire afterwards.
    fn stop(&mut self);

    /// Most verbose level forwarded to [`SessionCallbacks::on_log`].
    fn set_log_level(&mut self, level: LogLevel);
}

/// Factory for protocol sessions.
pub trait SessionBackend: Send + Sync {
    /// Create a session that reports to `callbacks`.
    fn init(
        &self,
        max_clients: u32,
        callbacks: Arc<dyn SessionCallbacks>,
    ) -> Result<Box<dyn Session>>;
}

/// Factory for service discovery handles.
pub trait Discovery: Send + Sync {
    /// Prepare advertising under `name` with the given hardware address.
    fn init(&self, name: &str, hw_address: &[u8]) -> Result<Box<dyn Advertisement>>;
}

/// Published discovery records for one running source.
pub trait Advertisement: Send {
    /// Advertise the RAOP (audio) service.
    fn register_raop(&mut self, port: u16) -> Result<()>;

    /// Advertise the AirPlay (video) service.
    fn register_airplay(&mut self, port: u16) -> Result<()>;

    /// Withdraw the RAOP record.
    fn unregister_raop(&mut self);

    /// Withdraw the AirPlay record.
    fn unregister_airplay(&mut self);
}
