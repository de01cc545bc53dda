//! Broker errors.

use relay_core::EnvelopeError;
use thiserror::Error;

/// Failure inside a broker backend.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Broker URL or options are unusable. Fatal at construction time.
    #[error("broker configuration error: {0}")]
    Config(String),

    /// Operation requires [`connect`](crate::Broker::connect) first.
    #[error("broker is not connected")]
    NotConnected,

    /// Connection lost or subscription stream ended.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// Error reported by the Redis client.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A received envelope could not be decoded.
    #[error("malformed envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Outbound envelope could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BrokerError {
    /// Whether reconnecting may clear the error.
    ///
    /// Decoding failures concern a single message and never warrant a
    /// reconnect; configuration errors never go away on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotConnected | Self::Connection(_) => true,
            Self::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.is_timeout()
            }
            Self::Config(_) | Self::Envelope(_) | Self::Serialization(_) => false,
        }
    }
}

/// Convenience alias for broker results.
pub type Result<T> = std::result::Result<T, BrokerError>;
