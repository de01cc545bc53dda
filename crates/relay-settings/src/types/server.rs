use serde::{Deserialize, Serialize};

/// Listener and per-connection limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (0 picks a free port).
    pub port: u16,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before sends start waiting.
    pub send_queue_capacity: usize,
    /// How long a send may wait on a full queue before the frame is dropped.
    pub send_timeout_ms: u64,
    /// Ping interval for idle sockets.
    pub heartbeat_interval_ms: u64,
    /// Close connections without an `Authorization: Bearer` header (1008).
    pub require_bearer: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
            send_timeout_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            require_bearer: false,
        }
    }
}
