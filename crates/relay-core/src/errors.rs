//! Envelope errors.
//!
//! The `Display` text of [`EnvelopeError`] is sent back to clients verbatim
//! inside `{"error": "..."}`, so keep it short and free of internals.

use thiserror::Error;

use crate::message::MessageType;

/// Failure to decode or validate a message envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Payload was not valid JSON.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// Payload decoded, but is not a JSON object.
    #[error("Message must be a JSON object")]
    NotAnObject,

    /// A required routing key was absent.
    #[error("Message is missing \"{0}\"")]
    MissingField(&'static str),

    /// `type` is not a known value, or not one a client may send.
    #[error("Invalid message type: {0}")]
    InvalidType(String),

    /// `type` requires a topic and none was supplied.
    #[error("Invalid message type \"{0}\" with no topic")]
    MissingTopic(MessageType),

    /// `type` requires a connection id and none was supplied.
    #[error("Invalid message type \"{0}\" with no conn_id")]
    MissingConnId(MessageType),

    /// A routing key has the wrong JSON shape.
    #[error("Invalid \"{field}\": {reason}")]
    InvalidField {
        /// Offending key.
        field: &'static str,
        /// What was wrong with it.
        reason: &'static str,
    },
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}

/// Convenience alias for envelope results.
pub type Result<T> = std::result::Result<T, EnvelopeError>;
