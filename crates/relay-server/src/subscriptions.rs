//! Subscribe / unsubscribe handling.
//!
//! Subscription messages mutate the sending connection's pattern set and are
//! never published.

use relay_core::topic::is_valid_subscription;
use relay_core::{Message, MessageType};
use tracing::debug;

use crate::connection::Connection;
use crate::errors::ConnectionErrorKind;

/// Whether `message` is a subscription control message.
pub fn is_subscription_message(message: &Message) -> bool {
    message.kind.is_subscription()
}

/// Apply a subscribe or unsubscribe to `connection`.
///
/// Returns whether the pattern set changed; repeating a subscribe, or
/// unsubscribing an absent pattern, is a no-op. Other message types are
/// ignored.
pub fn handle_subscription(
    connection: &Connection,
    message: &Message,
) -> Result<bool, ConnectionErrorKind> {
    let topic = message.topic.as_deref().unwrap_or_default();
    if !is_valid_subscription(topic) {
        return Err(ConnectionErrorKind::InvalidSubscription(topic.to_string()));
    }

    let changed = match message.kind {
        MessageType::Subscribe => connection.subscribe(topic),
        MessageType::Unsubscribe => connection.unsubscribe(topic),
        _ => return Ok(false),
    };
    debug!(
        conn_id = %connection.id(),
        kind = %message.kind,
        topic,
        changed,
        "subscription updated"
    );
    Ok(changed)
}
