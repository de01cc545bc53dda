//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used to render `/metrics`. Call once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// Connections registered (counter).
pub const CONNECTIONS_OPENED_TOTAL: &str = "relay_connections_opened_total";
/// Connections deregistered (counter).
pub const CONNECTIONS_CLOSED_TOTAL: &str = "relay_connections_closed_total";
/// Live connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// WebSocket session duration in seconds (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "relay_connection_duration_seconds";
/// Client messages published to the broker (counter).
pub const MESSAGES_PUBLISHED_TOTAL: &str = "relay_messages_published_total";
/// Messages received from the broker (counter).
pub const MESSAGES_RECEIVED_TOTAL: &str = "relay_messages_received_total";
/// Frames handed to a connection's transport (counter).
pub const MESSAGES_DELIVERED_TOTAL: &str = "relay_messages_delivered_total";
/// Frames a transport refused (counter).
pub const MESSAGES_DROPPED_TOTAL: &str = "relay_messages_dropped_total";
/// Inbound client messages rejected with an error reply (counter).
pub const INBOUND_REJECTED_TOTAL: &str = "relay_inbound_rejected_total";
/// Broker listener reconnect attempts (counter).
pub const BROKER_RECONNECTS_TOTAL: &str = "relay_broker_reconnects_total";
