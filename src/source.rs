//! Source builder and host-facing lifecycle.
//!
//! The [`SourceBuilder`] provides a fluent API for configuring the relay and
//! its collaborators. The [`AirPlaySource`] manages the lifecycle:
//! 1. Create the session with the relay as its callback target
//! 2. Start the session and learn its port
//! 3. Advertise RAOP and AirPlay records
//! 4. Serve frames to the host through `fill_next_output`
//!
//! # Example
//!
//! ```ignore
//! use airplay_relay::AirPlaySource;
//!
//! let source = AirPlaySource::builder()
//!     .session_backend(backend)
//!     .discovery(mdns)
//!     .max_buffers(16)
//!     .on_connected_changed(|connected| println!("connected: {connected}"))
//!     .build()?;
//!
//! source.start()?;
//! let mut dest = vec![0u8; source.blocksize()];
//! let n = source.fill_next_output(&mut dest)?;
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::SourceConfig;
use crate::error::{FlowError, RelayError, Result};
use crate::frame::{AudioFrame, VideoFrame};
use crate::relay::{FrameRelay, RelayStats};
use crate::session::{
    Advertisement, Discovery, LogLevel, Session, SessionBackend, SessionCallbacks,
};
use crate::watcher::{ConnectionNotify, ConnectionWatcher};

/// Time format for produced buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Buffers are timestamped with running time.
    Time,
}

/// Descriptive element metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementMetadata {
    /// Human readable name.
    pub long_name: &'static str,
    /// Element classification.
    pub klass: &'static str,
    /// Short description.
    pub description: &'static str,
}

/// Metadata of the AirPlay source element.
pub const ELEMENT_METADATA: ElementMetadata = ElementMetadata {
    long_name: "AirPlay source",
    klass: "Source/Video/Network",
    description: "Receives AirPlay video",
};

/// Builder for configuring and creating an [`AirPlaySource`].
pub struct SourceBuilder {
    config: SourceConfig,
    session_backend: Option<Arc<dyn SessionBackend>>,
    discovery: Option<Arc<dyn Discovery>>,
    on_connected: Option<ConnectionNotify>,
}

impl SourceBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: SourceConfig::default(),
            session_backend: None,
            discovery: None,
            on_connected: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the protocol session backend.
    pub fn session_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.session_backend = Some(backend);
        self
    }

    /// Set the service discovery backend.
    pub fn discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Set the number of frames allowed to wait before new ones are dropped.
    ///
    /// Default: 10
    pub fn max_buffers(mut self, limit: usize) -> Self {
        self.config.max_buffers = limit;
        self
    }

    /// Set the consumer wait slice; bounds unlock latency.
    ///
    /// Sub-millisecond values round up to 1 ms.
    ///
    /// Default: 500 ms
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        let millis = match timeout.as_millis() {
            0 if !timeout.is_zero() => 1,
            millis => millis,
        };
        self.config.poll_timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    /// Set the destination size hint for the host.
    ///
    /// Default: 2 MiB
    pub fn blocksize(mut self, blocksize: usize) -> Self {
        self.config.blocksize = blocksize;
        self
    }

    /// Set the advertised service name.
    pub fn service_name(mut self, name: &str) -> Self {
        self.config.service_name = name.to_string();
        self
    }

    /// Set the advertised hardware address.
    pub fn hw_address(mut self, hw_address: [u8; 6]) -> Self {
        self.config.hw_address = hw_address;
        self
    }

    /// Set the maximum concurrent session clients.
    pub fn max_clients(mut self, max_clients: u32) -> Self {
        self.config.max_clients = max_clients;
        self
    }

    /// Forward session debug logs instead of info and above.
    pub fn session_debug_log(mut self, enabled: bool) -> Self {
        self.config.session_debug_log = enabled;
        self
    }

    /// Notify on every change of the `connected` property.
    pub fn on_connected_changed<F>(mut self, notify: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_connected = Some(Box::new(notify));
        self
    }

    /// Validate the configuration and build the source (not yet started).
    pub fn build(self) -> Result<AirPlaySource> {
        self.config.validate()?;
        let session_backend = self
            .session_backend
            .ok_or_else(|| RelayError::Config("session backend not set".into()))?;
        let discovery = self
            .discovery
            .ok_or_else(|| RelayError::Config("discovery backend not set".into()))?;

        let watcher = match self.on_connected {
            Some(notify) => ConnectionWatcher::with_notify(notify),
            None => ConnectionWatcher::new(),
        };

        tracing::debug!(max_buffers = self.config.max_buffers, "init");
        Ok(AirPlaySource {
            relay: Arc::new(FrameRelay::new(self.config.max_buffers)),
            watcher: Arc::new(watcher),
            config: self.config,
            session_backend,
            discovery,
            running: Mutex::new(None),
        })
    }
}

impl Default for SourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback target handed to the session.
struct RelayCallbacks {
    relay: Arc<FrameRelay>,
    watcher: Arc<ConnectionWatcher>,
}

impl SessionCallbacks for RelayCallbacks {
    fn on_connect(&self) {
        self.watcher.on_connect();
    }

    fn on_disconnect(&self) {
        self.watcher.on_disconnect();
    }

    fn on_video_frame(&self, frame: VideoFrame<'_>) {
        self.relay.submit_frame(&frame);
    }

    fn on_audio_frame(&self, frame: AudioFrame<'_>) {
        self.relay.discard_audio(&frame);
    }

    fn on_log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!("raop: {}", message),
            LogLevel::Warning => tracing::warn!("raop: {}", message),
            LogLevel::Info => tracing::info!("raop: {}", message),
            LogLevel::Debug => tracing::debug!("raop: {}", message),
        }
    }
}

/// Session and advertisement owned while started.
struct Running {
    session: Box<dyn Session>,
    advertisement: Box<dyn Advertisement>,
}

/// A live, pull-driven AirPlay video source.
///
/// `start`/`stop` come from the host's state changes, `fill_next_output`
/// from its streaming thread, and `request_unlock`/`request_unlock_stop`
/// from its flushing path.
pub struct AirPlaySource {
    config: SourceConfig,
    relay: Arc<FrameRelay>,
    watcher: Arc<ConnectionWatcher>,
    session_backend: Arc<dyn SessionBackend>,
    discovery: Arc<dyn Discovery>,
    running: Mutex<Option<Running>>,
}

impl AirPlaySource {
    /// Create a new source builder.
    pub fn builder() -> SourceBuilder {
        SourceBuilder::new()
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start the session and advertise it.
    ///
    /// On failure everything created so far is torn down before the error
    /// is returned, so a later `start()` begins from a clean state.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running();
        if running.is_some() {
            return Err(RelayError::AlreadyStarted);
        }

        tracing::debug!("start");

        let callbacks: Arc<dyn SessionCallbacks> = Arc::new(RelayCallbacks {
            relay: self.relay.clone(),
            watcher: self.watcher.clone(),
        });

        let mut session = self
            .session_backend
            .init(self.config.max_clients, callbacks)
            .map_err(|e| {
                tracing::error!("{}", e);
                e
            })?;

        session.set_log_level(if self.config.session_debug_log {
            LogLevel::Debug
        } else {
            LogLevel::Info
        });

        let port = match session.start() {
            Ok(port) => port,
            Err(e) => {
                tracing::error!("{}", e);
                session.stop();
                return Err(e);
            }
        };

        let advertisement = match self.advertise(port) {
            Ok(advertisement) => advertisement,
            Err(e) => {
                tracing::error!("{}", e);
                session.stop();
                return Err(e);
            }
        };

        tracing::debug!(port, "started");
        *running = Some(Running {
            session,
            advertisement,
        });
        Ok(())
    }

    /// Register discovery records for the session listening on `port`.
    fn advertise(&self, port: u16) -> Result<Box<dyn Advertisement>> {
        let mut advertisement = self
            .discovery
            .init(&self.config.service_name, &self.config.hw_address)?;

        if let Err(e) = advertisement.register_raop(port) {
            advertisement.unregister_raop();
            return Err(e);
        }
        if let Err(e) = advertisement.register_airplay(port.wrapping_add(1)) {
            advertisement.unregister_raop();
            advertisement.unregister_airplay();
            return Err(e);
        }
        Ok(advertisement)
    }

    /// Stop the session, withdraw the records and drop queued frames.
    ///
    /// No session callback runs after this returns. A no-op when not started.
    pub fn stop(&self) {
        let Some(mut running) = self.running().take() else {
            return;
        };

        tracing::debug!("stop: destroying session");
        running.session.stop();
        drop(running.session);

        tracing::debug!("stop: unregistering raop");
        running.advertisement.unregister_raop();
        tracing::debug!("stop: unregistering airplay");
        running.advertisement.unregister_airplay();

        let stale = self.relay.drain();
        tracing::debug!(stale, "stop");
    }

    /// Check if the source is started.
    pub fn is_started(&self) -> bool {
        self.running().is_some()
    }

    /// Copy the next frame into `dest`.
    ///
    /// Blocks until a frame arrives or unlock is requested. Returns the bytes
    /// written; a frame larger than `dest` is truncated to `dest.len()`.
    pub fn fill_next_output(&self, dest: &mut [u8]) -> std::result::Result<usize, FlowError> {
        if !self.is_started() {
            return Err(FlowError::Error(RelayError::NotStarted.to_string()));
        }

        tracing::trace!("fill: popping buffer");
        let buf = self.relay.take_frame(self.config.poll_timeout())?;

        tracing::trace!(incoming = buf.len(), buffer = dest.len(), "fill");
        let written = self.relay.copy_out(&buf, dest);
        self.relay.release(buf);

        let result = if self.relay.is_cancelled() {
            Err(FlowError::Flushing)
        } else if written == 0 {
            Err(FlowError::Eos)
        } else {
            Ok(written)
        };

        tracing::trace!("fill exit");
        result
    }

    /// Unblock a pending `fill_next_output` and make further calls flush.
    pub fn request_unlock(&self) {
        tracing::debug!("unlock");
        self.relay.cancel();
    }

    /// Clear a previous unlock request.
    pub fn request_unlock_stop(&self) {
        tracing::debug!("unlock stop");
        self.relay.reset_cancel();
    }

    /// Whether a client is connected.
    pub fn connected(&self) -> bool {
        self.watcher.get_connected()
    }

    /// Always live: frames are produced in real time by the sender.
    #[inline]
    pub fn is_live(&self) -> bool {
        true
    }

    /// Buffer format.
    #[inline]
    pub fn format(&self) -> Format {
        Format::Time
    }

    /// The host should timestamp buffers on arrival.
    #[inline]
    pub fn do_timestamp(&self) -> bool {
        true
    }

    /// Suggested destination buffer size.
    #[inline]
    pub fn blocksize(&self) -> usize {
        self.config.blocksize
    }

    /// Element metadata.
    #[inline]
    pub fn metadata(&self) -> ElementMetadata {
        ELEMENT_METADATA
    }

    /// Active configuration.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Relay counters.
    pub fn stats(&self) -> RelayStats {
        self.relay.stats()
    }

    /// The underlying relay.
    pub fn relay(&self) -> &Arc<FrameRelay> {
        &self.relay
    }
}

impl Drop for AirPlaySource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameType;
    use crate::session::loopback::{LoopbackBackend, LoopbackDriver, ServiceKind};

    fn source_with(builder: SourceBuilder) -> (AirPlaySource, LoopbackDriver) {
        let backend = LoopbackBackend::new();
        let driver = backend.driver();
        let source = builder
            .session_backend(Arc::new(backend.clone()))
            .discovery(Arc::new(backend))
            .build()
            .unwrap();
        (source, driver)
    }

    #[test]
    fn test_builder_configuration() {
        let builder = AirPlaySource::builder()
            .max_buffers(4)
            .poll_timeout(Duration::from_millis(50))
            .blocksize(4096)
            .service_name("kitchen")
            .hw_address([1, 2, 3, 4, 5, 6])
            .max_clients(2)
            .session_debug_log(false);

        assert_eq!(builder.config.max_buffers, 4);
        assert_eq!(builder.config.poll_timeout_ms, 50);
        assert_eq!(builder.config.blocksize, 4096);
        assert_eq!(builder.config.service_name, "kitchen");
        assert_eq!(builder.config.hw_address, [1, 2, 3, 4, 5, 6]);
        assert_eq!(builder.config.max_clients, 2);
        assert!(!builder.config.session_debug_log);
    }

    #[test]
    fn test_poll_timeout_rounds_up_sub_millisecond() {
        let builder = AirPlaySource::builder().poll_timeout(Duration::from_micros(300));
        assert_eq!(builder.config.poll_timeout_ms, 1);

        let builder = AirPlaySource::builder().poll_timeout(Duration::from_micros(2500));
        assert_eq!(builder.config.poll_timeout_ms, 2);

        let (source, _driver) =
            source_with(AirPlaySource::builder().poll_timeout(Duration::from_nanos(1)));
        assert_eq!(source.config().poll_timeout_ms, 1);
    }

    #[test]
    fn test_poll_timeout_zero_rejected() {
        let backend = LoopbackBackend::new();
        let result = AirPlaySource::builder()
            .poll_timeout(Duration::ZERO)
            .session_backend(Arc::new(backend.clone()))
            .discovery(Arc::new(backend))
            .build();
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_build_requires_backends() {
        let err = AirPlaySource::builder().build().err().unwrap();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let backend = LoopbackBackend::new();
        let result = AirPlaySource::builder()
            .max_buffers(0)
            .session_backend(Arc::new(backend.clone()))
            .discovery(Arc::new(backend))
            .build();
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_source_properties() {
        let (source, _driver) = source_with(AirPlaySource::builder());
        assert!(source.is_live());
        assert!(source.do_timestamp());
        assert_eq!(source.format(), Format::Time);
        assert_eq!(source.blocksize(), 2 << 20);
        assert_eq!(source.metadata().klass, "Source/Video/Network");
        assert!(!source.connected());
    }

    #[test]
    fn test_start_advertises_both_records() {
        let (source, driver) = source_with(AirPlaySource::builder().service_name("den"));
        source.start().unwrap();

        let records = driver.advertised();
        assert_eq!(records.len(), 2);
        let (kind, port) = records[0];
        assert_eq!(kind, ServiceKind::Raop);
        assert_eq!(records[1], (ServiceKind::AirPlay, port + 1));
        assert_eq!(driver.service_name().as_deref(), Some("den"));
        assert_eq!(driver.log_level(), Some(LogLevel::Debug));

        source.stop();
        assert!(driver.advertised().is_empty());
        assert!(!driver.is_running());
        assert_eq!(driver.live_sessions(), 0);
    }

    #[test]
    fn test_start_twice_rejected() {
        let (source, _driver) = source_with(AirPlaySource::builder());
        source.start().unwrap();
        assert!(matches!(source.start(), Err(RelayError::AlreadyStarted)));
    }

    #[test]
    fn test_session_init_failure() {
        let (source, driver) = source_with(AirPlaySource::builder());
        driver.fail_next_init("no port");

        assert!(matches!(source.start(), Err(RelayError::SessionInit(_))));
        assert!(!source.is_started());
        assert!(driver.advertised().is_empty());
        assert!(source.start().is_ok());
    }

    #[test]
    fn test_session_start_failure_tears_down() {
        let (source, driver) = source_with(AirPlaySource::builder());
        driver.fail_next_start("bind failed");

        assert!(matches!(source.start(), Err(RelayError::SessionInit(_))));
        assert_eq!(driver.live_sessions(), 0);
    }

    #[test]
    fn test_discovery_failure_tears_down_session() {
        let (source, driver) = source_with(AirPlaySource::builder());
        driver.fail_next_discovery("mdns unavailable");

        let err = source.start().unwrap_err();
        assert!(matches!(err, RelayError::Discovery(_)));
        assert_eq!(driver.live_sessions(), 0);
        assert!(!driver.is_running());

        source.start().unwrap();
        assert_eq!(driver.live_sessions(), 1);
    }

    #[test]
    fn test_fill_copies_frame() {
        let (source, driver) = source_with(AirPlaySource::builder());
        source.start().unwrap();
        driver.send_video(b"frame-bytes", 3, FrameType::Idr);

        let mut dest = vec![0u8; 64];
        assert_eq!(source.fill_next_output(&mut dest), Ok(11));
        assert_eq!(&dest[..11], b"frame-bytes");
        assert_eq!(source.relay().spare_buffers(), 1);
    }

    #[test]
    fn test_fill_truncates_small_destination() {
        let (source, driver) = source_with(AirPlaySource::builder());
        source.start().unwrap();
        driver.send_video(&[5u8; 100], 0, FrameType::NonIdr);

        let mut dest = [0u8; 50];
        assert_eq!(source.fill_next_output(&mut dest), Ok(50));
        assert_eq!(source.stats().truncated, 1);
        assert_eq!(source.relay().spare_buffers(), 1);
    }

    #[test]
    fn test_fill_empty_frame_is_eos() {
        let (source, driver) = source_with(AirPlaySource::builder());
        source.start().unwrap();
        driver.send_video(&[], 0, FrameType::NonIdr);

        let mut dest = [0u8; 8];
        assert_eq!(source.fill_next_output(&mut dest), Err(FlowError::Eos));
    }

    #[test]
    fn test_fill_before_start_errors() {
        let (source, _driver) = source_with(AirPlaySource::builder());
        let mut dest = [0u8; 8];
        assert!(matches!(
            source.fill_next_output(&mut dest),
            Err(FlowError::Error(_))
        ));
    }

    #[test]
    fn test_unlock_flushes_until_unlock_stop() {
        let (source, driver) = source_with(AirPlaySource::builder());
        source.start().unwrap();
        driver.send_video(b"queued", 0, FrameType::NonIdr);

        source.request_unlock();
        let mut dest = [0u8; 16];
        assert_eq!(source.fill_next_output(&mut dest), Err(FlowError::Flushing));
        assert_eq!(source.relay().queued(), 1);

        source.request_unlock_stop();
        assert_eq!(source.fill_next_output(&mut dest), Ok(6));
    }

    #[test]
    fn test_audio_is_discarded() {
        let (source, driver) = source_with(AirPlaySource::builder());
        source.start().unwrap();
        driver.send_audio(b"aac", 0);

        assert_eq!(source.relay().queued(), 0);
        assert_eq!(source.stats().audio_discarded, 1);
    }

    #[test]
    fn test_connected_property_follows_session() {
        let edges = Arc::new(Mutex::new(Vec::new()));
        let seen = edges.clone();
        let (source, driver) = source_with(
            AirPlaySource::builder()
                .on_connected_changed(move |c| seen.lock().unwrap().push(c)),
        );
        source.start().unwrap();

        driver.connect();
        driver.connect();
        assert!(source.connected());
        driver.disconnect();
        assert!(!source.connected());

        assert_eq!(*edges.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_stop_drains_queued_frames() {
        let (source, driver) = source_with(AirPlaySource::builder());
        source.start().unwrap();
        for _ in 0..3 {
            driver.send_video(b"stale", 0, FrameType::NonIdr);
        }

        source.stop();
        assert_eq!(source.relay().queued(), 0);
        assert!(!driver.send_video(b"late", 0, FrameType::NonIdr));
    }
}
