//! Settings types.

mod broker;
mod logging;
mod server;

pub use broker::{BrokerSettings, ReconnectSettings};
pub use logging::LoggingSettings;
pub use server::ServerSettings;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Pub/sub backend.
    pub broker: BrokerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject combinations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.broker.url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("broker.url is empty".into()));
        }
        if self.broker.channel.trim().is_empty() {
            return Err(SettingsError::InvalidValue("broker.channel is empty".into()));
        }
        if self.broker.reconnect.base_delay_ms > self.broker.reconnect.max_delay_ms {
            return Err(SettingsError::InvalidValue(
                "broker.reconnect.baseDelayMs exceeds maxDelayMs".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
