//! Server configuration.

use std::time::Duration;

use relay_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Listener address and per-connection limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// How long a send waits on a full queue before dropping the frame.
    pub send_timeout: Duration,
    /// Interval between server-initiated Ping frames.
    pub heartbeat_interval: Duration,
    /// Reject upgrades without an `Authorization: Bearer` header.
    pub require_bearer: bool,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_message_size: settings.max_message_size,
            send_queue_capacity: settings.send_queue_capacity,
            send_timeout: Duration::from_millis(settings.send_timeout_ms),
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            require_bearer: settings.require_bearer,
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 1024 * 1024, // 1 MB
            send_queue_capacity: 256,
            send_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            require_bearer: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_limits() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_message_size, 1024 * 1024);
        assert_eq!(cfg.send_queue_capacity, 256);
        assert_eq!(cfg.send_timeout, Duration::from_secs(5));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert!(!cfg.require_bearer);
    }

    #[test]
    fn from_settings_converts_units() {
        let settings = ServerSettings {
            host: "0.0.0.0".into(),
            port: 9000,
            send_timeout_ms: 250,
            heartbeat_interval_ms: 1_500,
            require_bearer: true,
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9000");
        assert_eq!(cfg.send_timeout, Duration::from_millis(250));
        assert_eq!(cfg.heartbeat_interval, Duration::from_millis(1_500));
        assert!(cfg.require_bearer);
        assert_eq!(cfg.max_message_size, settings.max_message_size);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig {
            port: 8080,
            ..ServerConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
