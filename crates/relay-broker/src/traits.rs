//! The broker capability.

use async_trait::async_trait;
use relay_core::Message;
use serde_json::Value;

use crate::errors::Result;

/// A publish/subscribe backend.
///
/// All methods take `&self` so a single handle can be shared between the
/// publishing path and the listener loop.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Establish the backend connection. Calling it again is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Release the backend connection.
    async fn disconnect(&self) -> Result<()>;

    /// Start receiving messages published on `channel`.
    async fn subscribe(&self, channel: &str) -> Result<()>;

    /// Stop receiving messages published on `channel`.
    ///
    /// Unsubscribing from a channel that was never subscribed is a no-op.
    async fn unsubscribe(&self, channel: &str) -> Result<()>;

    /// Publish a message envelope on `channel`.
    ///
    /// Objects are encoded as JSON; string values are sent as-is and must
    /// already hold an encoded envelope.
    async fn publish(&self, channel: &str, message: Value) -> Result<()>;

    /// Wait for the next message on a subscribed channel.
    ///
    /// `Ok(None)` means "nothing to deliver right now"; callers loop.
    async fn get_message(&self) -> Result<Option<Message>>;
}
