//! In-process broker.
//!
//! A single unbounded FIFO queue carries every published item. Items are
//! tagged with their channel and dropped on read when that channel is not
//! subscribed at the time of reading.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;
use relay_core::{Message, untag};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};

use crate::errors::{BrokerError, Result};
use crate::traits::Broker;

#[derive(Debug)]
struct QueuedMessage {
    channel: String,
    payload: Value,
}

/// Broker backed by an in-process queue.
///
/// Only connections within the same process see each other's messages.
#[derive(Debug)]
pub struct MemoryBroker {
    tx: mpsc::UnboundedSender<QueuedMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<QueuedMessage>>,
    channels: RwLock<HashSet<String>>,
}

impl MemoryBroker {
    /// Create an empty broker with no subscriptions.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            channels: RwLock::new(HashSet::new()),
        }
    }

    /// Whether `channel` is currently subscribed.
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels.read().contains(channel)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<()> {
        let _ = self.channels.write().insert(channel.to_string());
        debug!(channel, "memory broker subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        if !self.channels.write().remove(channel) {
            debug!(channel, "unsubscribe for channel that was not subscribed");
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: Value) -> Result<()> {
        self.tx
            .send(QueuedMessage {
                channel: channel.to_string(),
                payload: message,
            })
            .map_err(|_| BrokerError::Connection("memory queue closed".into()))
    }

    async fn get_message(&self) -> Result<Option<Message>> {
        let queued = self.rx.lock().await.recv().await;
        let Some(QueuedMessage { channel, payload }) = queued else {
            return Err(BrokerError::Connection("memory queue closed".into()));
        };

        if !self.is_subscribed(&channel) {
            trace!(channel = %channel, "discarding message for unsubscribed channel");
            return Ok(None);
        }

        Ok(Some(untag(payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use relay_core::MessageType;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_subscribed_channel() {
        let broker = MemoryBroker::new();
        broker.subscribe("c").await.unwrap();
        broker
            .publish("c", json!({"type": "broadcast", "topic": null, "x": 1}))
            .await
            .unwrap();

        let msg = broker.get_message().await.unwrap().unwrap();
        assert_eq!(msg.kind, MessageType::Broadcast);
        assert_eq!(msg.data["x"], json!(1));
    }

    #[tokio::test]
    async fn discards_unsubscribed_channel_without_redelivery() {
        let broker = MemoryBroker::new();
        broker.subscribe("c").await.unwrap();
        broker
            .publish("other", json!({"type": "broadcast"}))
            .await
            .unwrap();
        broker
            .publish("c", json!({"type": "send", "topic": "a/b"}))
            .await
            .unwrap();

        assert!(broker.get_message().await.unwrap().is_none());
        let msg = broker.get_message().await.unwrap().unwrap();
        assert_eq!(msg.kind, MessageType::Send);
    }

    #[tokio::test]
    async fn subscription_checked_at_read_time() {
        let broker = MemoryBroker::new();
        broker.subscribe("c").await.unwrap();
        broker.publish("c", json!({"type": "broadcast"})).await.unwrap();
        broker.unsubscribe("c").await.unwrap();

        assert!(broker.get_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let broker = MemoryBroker::new();
        broker.subscribe("c").await.unwrap();
        for n in 0..5 {
            broker
                .publish("c", json!({"type": "broadcast", "n": n}))
                .await
                .unwrap();
        }
        for n in 0..5 {
            let msg = broker.get_message().await.unwrap().unwrap();
            assert_eq!(msg.data["n"], json!(n));
        }
    }

    #[tokio::test]
    async fn accepts_preencoded_string_payloads() {
        let broker = MemoryBroker::new();
        broker.subscribe("c").await.unwrap();
        broker
            .publish("c", json!(r#"{"type":"send","topic":"a/b","k":"v"}"#))
            .await
            .unwrap();

        let msg = broker.get_message().await.unwrap().unwrap();
        assert_eq!(msg.topic.as_deref(), Some("a/b"));
        assert_eq!(msg.data["k"], json!("v"));
    }

    #[tokio::test]
    async fn malformed_envelope_is_an_error() {
        let broker = MemoryBroker::new();
        broker.subscribe("c").await.unwrap();
        broker.publish("c", json!({"no_type": true})).await.unwrap();

        assert_matches!(broker.get_message().await, Err(BrokerError::Envelope(_)));
    }

    #[tokio::test]
    async fn unsubscribe_unknown_channel_is_noop() {
        let broker = MemoryBroker::new();
        broker.unsubscribe("never").await.unwrap();
        assert!(!broker.is_subscribed("never"));
    }

    #[tokio::test]
    async fn get_message_waits_for_publish() {
        let broker = std::sync::Arc::new(MemoryBroker::new());
        broker.subscribe("c").await.unwrap();

        let reader = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.get_message().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        broker.publish("c", json!({"type": "broadcast"})).await.unwrap();
        let msg = reader.await.unwrap().unwrap();
        assert!(msg.is_some());
    }
}
