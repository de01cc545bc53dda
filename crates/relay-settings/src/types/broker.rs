use serde::{Deserialize, Serialize};

/// Pub/sub backend selection and reconnect pacing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerSettings {
    /// `memory://` or `redis://host:port/db`.
    pub url: String,
    /// Channel every relay process publishes to and listens on.
    pub channel: String,
    /// Receive poll interval for polling backends, in ms.
    pub poll_interval_ms: u64,
    /// Listener reconnect backoff.
    pub reconnect: ReconnectSettings,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            channel: "relay".to_string(),
            poll_interval_ms: 1_000,
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// Exponential backoff for the broker listener.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// First retry delay in ms.
    pub base_delay_ms: u64,
    /// Cap on a single delay in ms.
    pub max_delay_ms: u64,
    /// Symmetric jitter, 0.0–1.0.
    pub jitter_factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
        }
    }
}
