//! Server error types.
//!
//! Per-connection failures travel as [`ConnectionError`], which carries the
//! offending connection so [`report_error`] can answer it directly.

use std::sync::Arc;

use metrics::counter;
use relay_broker::BrokerError;
use relay_core::EnvelopeError;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::metrics::INBOUND_REJECTED_TOTAL;

/// What went wrong with a client's message.
#[derive(Debug, Error)]
pub enum ConnectionErrorKind {
    /// Payload failed envelope decoding or validation.
    #[error("{0}")]
    InvalidMessage(#[from] EnvelopeError),

    /// Subscribe/unsubscribe without a usable topic pattern.
    #[error("\"{0}\" is not a valid subscription topic")]
    InvalidSubscription(String),

    /// The broker rejected the publish.
    #[error("failed to publish message")]
    Publish(#[source] BrokerError),
}

/// A failure attributable to one connection.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ConnectionError {
    /// Connection whose message caused the failure.
    pub connection: Arc<Connection>,
    /// Failure detail.
    #[source]
    pub kind: ConnectionErrorKind,
}

impl ConnectionError {
    /// Attach `kind` to `connection`.
    pub fn new(connection: Arc<Connection>, kind: impl Into<ConnectionErrorKind>) -> Self {
        Self {
            connection,
            kind: kind.into(),
        }
    }
}

/// Answer the offending connection with `{"error": "..."}`.
///
/// The connection stays open.
pub async fn report_error(err: ConnectionError) {
    let ConnectionError { connection, kind } = err;
    let conn_id = connection.id();

    match &kind {
        ConnectionErrorKind::Publish(source) => {
            warn!(conn_id, error = %source, "failed to publish client message");
        }
        other => debug!(conn_id, error = %other, "rejected client message"),
    }
    counter!(INBOUND_REJECTED_TOTAL).increment(1);

    let reply = json!({ "error": kind.to_string() });
    if let Err(e) = connection.send_json(&reply).await {
        debug!(conn_id, error = %e, "could not deliver error reply");
    }
}

/// Failure starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or accepting on the listener failed.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),

    /// Broker could not be created or connected.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Metrics recorder could not be installed.
    #[error("metrics recorder error: {0}")]
    Metrics(String),
}
