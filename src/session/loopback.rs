//! In-process session and discovery backend.
//!
//! [`LoopbackBackend`] implements both [`SessionBackend`] and [`Discovery`]
//! without any networking. Its [`LoopbackDriver`] plays the part of the
//! session's worker thread: frames and connection edges pushed through the
//! driver are delivered to whichever session is currently started.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use airplay_relay::session::loopback::LoopbackBackend;
//! use airplay_relay::frame::FrameType;
//! use airplay_relay::AirPlaySource;
//!
//! let backend = LoopbackBackend::new();
//! let driver = backend.driver();
//! let source = AirPlaySource::builder()
//!     .session_backend(Arc::new(backend.clone()))
//!     .discovery(Arc::new(backend))
//!     .build()
//!     .unwrap();
//!
//! source.start().unwrap();
//! driver.send_video(b"\x00\x00\x00\x01", 0, FrameType::Idr);
//!
//! let mut dest = vec![0u8; source.blocksize()];
//! assert_eq!(source.fill_next_output(&mut dest), Ok(4));
//! source.stop();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::{Advertisement, Discovery, LogLevel, Session, SessionBackend, SessionCallbacks};
use crate::error::{RelayError, Result};
use crate::frame::{AudioFrame, FrameType, VideoFrame};

/// First port handed out by the loopback backend.
pub const LOOPBACK_BASE_PORT: u16 = 7000;

/// Advertised service kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// `_raop._tcp`
    Raop,
    /// `_airplay._tcp`
    AirPlay,
}

#[derive(Default)]
struct State {
    next_id: u64,
    next_port: u16,
    /// Session ids created and not yet dropped.
    alive: Vec<u64>,
    /// Session id currently started.
    running: Option<u64>,
    log_level: Option<LogLevel>,
    fail_init: Option<String>,
    fail_start: Option<String>,
    fail_discovery: Option<String>,
    service_name: Option<String>,
    records: Vec<(ServiceKind, u16)>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    /// Held for reading while a callback runs, so `stop` waits it out.
    target: RwLock<Option<Arc<dyn SessionCallbacks>>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deliver<F>(&self, f: F) -> bool
    where
        F: FnOnce(&dyn SessionCallbacks),
    {
        let target = self.target.read().unwrap_or_else(|e| e.into_inner());
        match target.as_ref() {
            Some(callbacks) => {
                f(callbacks.as_ref());
                true
            }
            None => false,
        }
    }

    fn set_target(&self, callbacks: Option<Arc<dyn SessionCallbacks>>) {
        *self.target.write().unwrap_or_else(|e| e.into_inner()) = callbacks;
    }
}

/// Loopback session and discovery backend.
#[derive(Clone, Default)]
pub struct LoopbackBackend {
    shared: Arc<Shared>,
}

impl LoopbackBackend {
    /// Create a backend with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for injecting session events.
    pub fn driver(&self) -> LoopbackDriver {
        LoopbackDriver {
            shared: self.shared.clone(),
        }
    }
}

impl SessionBackend for LoopbackBackend {
    fn init(
        &self,
        max_clients: u32,
        callbacks: Arc<dyn SessionCallbacks>,
    ) -> Result<Box<dyn Session>> {
        let mut state = self.shared.state();
        if let Some(reason) = state.fail_init.take() {
            return Err(RelayError::SessionInit(reason));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.alive.push(id);
        tracing::debug!(id, max_clients, "loopback session created");

        Ok(Box::new(LoopbackSession {
            id,
            shared: self.shared.clone(),
            callbacks,
        }))
    }
}

impl Discovery for LoopbackBackend {
    fn init(&self, name: &str, hw_address: &[u8]) -> Result<Box<dyn Advertisement>> {
        let mut state = self.shared.state();
        if let Some(reason) = state.fail_discovery.take() {
            return Err(RelayError::Discovery(reason));
        }

        tracing::debug!(name, hw_address = ?hw_address, "loopback discovery ready");
        state.service_name = Some(name.to_string());
        Ok(Box::new(LoopbackAdvertisement {
            shared: self.shared.clone(),
        }))
    }
}

struct LoopbackSession {
    id: u64,
    shared: Arc<Shared>,
    callbacks: Arc<dyn SessionCallbacks>,
}

impl LoopbackSession {
    fn detach(&mut self) {
        let is_running = self.shared.state().running == Some(self.id);
        if is_running {
            // Blocks until in-flight callbacks return.
            self.shared.set_target(None);
            self.shared.state().running = None;
        }
    }
}

impl Session for LoopbackSession {
    fn start(&mut self) -> Result<u16> {
        let port = {
            let mut state = self.shared.state();
            if let Some(reason) = state.fail_start.take() {
                return Err(RelayError::SessionInit(reason));
            }
            if state.next_port == 0 {
                state.next_port = LOOPBACK_BASE_PORT;
            }
            let port = state.next_port;
            state.next_port = state.next_port.wrapping_add(2);
            state.running = Some(self.id);
            port
        };

        self.shared.set_target(Some(self.callbacks.clone()));
        tracing::debug!(id = self.id, port, "loopback session started");
        Ok(port)
    }

    fn stop(&mut self) {
        self.detach();
    }

    fn set_log_level(&mut self, level: LogLevel) {
        self.shared.state().log_level = Some(level);
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        self.detach();
        self.shared.state().alive.retain(|&id| id != self.id);
    }
}

struct LoopbackAdvertisement {
    shared: Arc<Shared>,
}

impl LoopbackAdvertisement {
    fn withdraw(&self, kind: ServiceKind) {
        self.shared.state().records.retain(|(k, _)| *k != kind);
    }
}

impl Advertisement for LoopbackAdvertisement {
    fn register_raop(&mut self, port: u16) -> Result<()> {
        self.shared.state().records.push((ServiceKind::Raop, port));
        Ok(())
    }

    fn register_airplay(&mut self, port: u16) -> Result<()> {
        self.shared.state().records.push((ServiceKind::AirPlay, port));
        Ok(())
    }

    fn unregister_raop(&mut self) {
        self.withdraw(ServiceKind::Raop);
    }

    fn unregister_airplay(&mut self) {
        self.withdraw(ServiceKind::AirPlay);
    }
}

/// Injects events as if they came from the session's worker thread.
#[derive(Clone)]
pub struct LoopbackDriver {
    shared: Arc<Shared>,
}

impl LoopbackDriver {
    /// Deliver a video frame. Returns `false` if no session is started.
    pub fn send_video(&self, data: &[u8], pts: u64, frame_type: FrameType) -> bool {
        self.shared
            .deliver(|cb| cb.on_video_frame(VideoFrame::new(data, pts, frame_type)))
    }

    /// Deliver an audio frame. Returns `false` if no session is started.
    pub fn send_audio(&self, data: &[u8], pts: u64) -> bool {
        self.shared
            .deliver(|cb| cb.on_audio_frame(AudioFrame::new(data, pts)))
    }

    /// Report a client connection.
    pub fn connect(&self) -> bool {
        self.shared.deliver(|cb| cb.on_connect())
    }

    /// Report a client disconnection.
    pub fn disconnect(&self) -> bool {
        self.shared.deliver(|cb| cb.on_disconnect())
    }

    /// Emit a session log line, subject to the configured level.
    pub fn log(&self, level: LogLevel, message: &str) -> bool {
        let enabled = match self.shared.state().log_level {
            Some(max) => level <= max,
            None => true,
        };
        enabled && self.shared.deliver(|cb| cb.on_log(level, message))
    }

    /// Make the next `SessionBackend::init` fail.
    pub fn fail_next_init(&self, reason: &str) {
        self.shared.state().fail_init = Some(reason.to_string());
    }

    /// Make the next `Session::start` fail.
    pub fn fail_next_start(&self, reason: &str) {
        self.shared.state().fail_start = Some(reason.to_string());
    }

    /// Make the next `Discovery::init` fail.
    pub fn fail_next_discovery(&self, reason: &str) {
        self.shared.state().fail_discovery = Some(reason.to_string());
    }

    /// Sessions created and not yet dropped.
    pub fn live_sessions(&self) -> usize {
        self.shared.state().alive.len()
    }

    /// Check if a session is started.
    pub fn is_running(&self) -> bool {
        self.shared.state().running.is_some()
    }

    /// Currently advertised records.
    pub fn advertised(&self) -> Vec<(ServiceKind, u16)> {
        self.shared.state().records.clone()
    }

    /// Name passed to the last `Discovery::init`.
    pub fn service_name(&self) -> Option<String> {
        self.shared.state().service_name.clone()
    }

    /// Level set by the last `Session::set_log_level`.
    pub fn log_level(&self) -> Option<LogLevel> {
        self.shared.state().log_level
    }
}
