//! Local fan-out of outbound messages.
//!
//! Each call snapshots the registry, encodes the payload once, and hands the
//! delivery loop to the [`TaskGroup`]. The caller never waits for delivery.

use std::sync::Arc;

use metrics::counter;
use relay_core::message::{CONN_ID_KEY, TYPE_KEY};
use relay_core::{ConnTarget, Message, MessageType};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::metrics::{MESSAGES_DELIVERED_TOTAL, MESSAGES_DROPPED_TOTAL};
use crate::registry::ConnectionRegistry;
use crate::tasks::TaskGroup;

#[derive(Clone, Debug)]
pub(crate) struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    tasks: Arc<TaskGroup>,
}

impl Dispatcher {
    pub(crate) fn new(registry: Arc<ConnectionRegistry>, tasks: Arc<TaskGroup>) -> Self {
        Self { registry, tasks }
    }

    /// Deliver to every connection with a pattern matching `topic`.
    pub(crate) fn send(&self, topic: String, payload: Map<String, Value>) {
        let targets = self.registry.snapshot();
        let text = encode(payload);
        self.tasks.spawn("send", async move {
            let mut delivered = 0usize;
            for conn in targets.iter().filter(|c| c.matches(&topic)) {
                if deliver(conn, &text).await {
                    delivered += 1;
                }
            }
            debug!(topic, delivered, "topic send complete");
        });
    }

    /// Deliver to every connection regardless of subscriptions.
    pub(crate) fn broadcast(&self, payload: Map<String, Value>) {
        let targets = self.registry.snapshot();
        let text = encode(payload);
        self.tasks.spawn("broadcast", async move {
            let mut delivered = 0usize;
            for conn in &targets {
                if deliver(conn, &text).await {
                    delivered += 1;
                }
            }
            debug!(delivered, recipients = targets.len(), "broadcast complete");
        });
    }

    /// Deliver to connections whose id is addressed by `target`.
    ///
    /// A single id stops at the first match. Unmatched ids are dropped.
    pub(crate) fn send_by_conn_id(&self, target: ConnTarget, payload: Map<String, Value>) {
        let targets = self.registry.snapshot();
        let text = encode(payload);
        self.tasks.spawn("send_by_conn_id", async move {
            let mut matched = 0usize;
            for conn in &targets {
                if !target.contains(&conn.id()) {
                    continue;
                }
                matched += 1;
                let _ = deliver(conn, &text).await;
                if target.is_single() {
                    break;
                }
            }
            if matched == 0 {
                debug!(target = ?target, "no connection with requested id");
            }
        });
    }

    /// Route a broker message by its type.
    ///
    /// Clients receive the data fields only, never the routing keys.
    pub(crate) fn send_msg(&self, message: Message) {
        let Message {
            kind,
            topic,
            conn_id,
            data,
        } = message;

        match kind {
            MessageType::Broadcast => self.broadcast(data),
            MessageType::SendByConnId => match conn_id {
                Some(target) => self.send_by_conn_id(target, data),
                None => warn!("send_by_conn_id message without conn_id dropped"),
            },
            _ => self.send(topic.unwrap_or_default(), data),
        }
    }

    /// Tell `connection` about its new id.
    pub(crate) fn notify_conn_id(&self, connection: Arc<Connection>, id: &str) {
        let mut payload = Map::new();
        let _ = payload.insert(
            TYPE_KEY.to_string(),
            Value::String(MessageType::SetConnId.to_string()),
        );
        let _ = payload.insert(CONN_ID_KEY.to_string(), Value::String(id.to_string()));
        let text = encode(payload);
        self.tasks.spawn("set_conn_id", async move {
            let _ = deliver(&connection, &text).await;
        });
    }
}

fn encode(payload: Map<String, Value>) -> Arc<String> {
    Arc::new(Value::Object(payload).to_string())
}

/// Hand `text` to one connection. Failures never stop the caller's loop.
async fn deliver(conn: &Connection, text: &Arc<String>) -> bool {
    match conn.send_text(Arc::clone(text)).await {
        Ok(()) => {
            counter!(MESSAGES_DELIVERED_TOTAL).increment(1);
            true
        }
        Err(e) => {
            counter!(MESSAGES_DROPPED_TOTAL).increment(1);
            debug!(conn_id = %conn.id(), error = %e, "dropping message for connection");
            false
        }
    }
}
