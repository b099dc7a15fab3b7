//! Source configuration.
//!
//! Every tunable has a default matching the reference AirPlay source, so an
//! empty JSON object is a valid configuration.
//!
//! # Example
//!
//! ```
//! use airplay_relay::config::SourceConfig;
//!
//! let config = SourceConfig::from_json(r#"{ "max_buffers": 4, "poll_timeout_ms": 100 }"#).unwrap();
//! assert_eq!(config.max_buffers, 4);
//! assert_eq!(config.service_name, "gstairplay");
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Default number of frames allowed to wait for the consumer.
pub const DEFAULT_MAX_BUFFERS: usize = 10;

/// Default consumer wait slice between cancellation checks.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 500;

/// Default destination buffer size hint for the host (2 MiB).
pub const DEFAULT_BLOCKSIZE: usize = 2 << 20;

/// Default advertised service name.
pub const DEFAULT_SERVICE_NAME: &str = "gstairplay";

/// Default advertised hardware address.
pub const DEFAULT_HW_ADDRESS: [u8; 6] = [0x48, 0x5d, 0x60, 0x7c, 0xee, 0x22];

/// Default maximum concurrent session clients.
pub const DEFAULT_MAX_CLIENTS: u32 = 10;

/// Configuration for an [`AirPlaySource`](crate::AirPlaySource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Frames allowed to wait in the relay before new ones are dropped.
    /// Also the number of spare buffers kept for reuse.
    pub max_buffers: usize,
    /// Consumer wait slice in milliseconds; bounds cancellation latency.
    pub poll_timeout_ms: u64,
    /// Destination buffer size hint for the host, in bytes.
    pub blocksize: usize,
    /// Name advertised through service discovery.
    pub service_name: String,
    /// Hardware address advertised through service discovery.
    pub hw_address: [u8; 6],
    /// Maximum concurrent clients accepted by the session.
    pub max_clients: u32,
    /// Forward session debug logs (otherwise info and above).
    pub session_debug_log: bool,
}

impl SourceConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SourceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_buffers == 0 {
            return Err(RelayError::Config("max_buffers must be at least 1".into()));
        }
        if self.poll_timeout_ms == 0 {
            return Err(RelayError::Config(
                "poll_timeout_ms must be at least 1".into(),
            ));
        }
        if self.blocksize == 0 {
            return Err(RelayError::Config("blocksize must be at least 1".into()));
        }
        if self.service_name.is_empty() {
            return Err(RelayError::Config("service_name must not be empty".into()));
        }
        Ok(())
    }

    /// Consumer wait slice as a `Duration`.
    #[inline]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_buffers: DEFAULT_MAX_BUFFERS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            blocksize: DEFAULT_BLOCKSIZE,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            hw_address: DEFAULT_HW_ADDRESS,
            max_clients: DEFAULT_MAX_CLIENTS,
            session_debug_log: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SourceConfig::default();
        assert_eq!(config.max_buffers, 10);
        assert_eq!(config.poll_timeout(), Duration::from_millis(500));
        assert_eq!(config.blocksize, 2 * 1024 * 1024);
        assert_eq!(config.hw_address, [0x48, 0x5d, 0x60, 0x7c, 0xee, 0x22]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = SourceConfig::from_json("{}").unwrap();
        assert_eq!(config, SourceConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config =
            SourceConfig::from_json(r#"{"service_name": "living-room", "max_clients": 2}"#)
                .unwrap();
        assert_eq!(config.service_name, "living-room");
        assert_eq!(config.max_clients, 2);
        assert_eq!(config.max_buffers, DEFAULT_MAX_BUFFERS);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SourceConfig::from_json(r#"{"max_buffers": 0}"#).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));

        let err = SourceConfig::from_json(r#"{"poll_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));

        let err = SourceConfig::from_json(r#"{"service_name": ""}"#).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = SourceConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, RelayError::Json(_)));
    }

    #[test]
    fn test_serialize_roundtrip_fields() {
        let json = serde_json::to_value(SourceConfig::default()).unwrap();
        assert_eq!(json["max_buffers"], 10);
        assert_eq!(json["poll_timeout_ms"], 500);
        assert_eq!(json["service_name"], "gstairplay");
    }
}
