//! Live client connection state.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use relay_core::ids::ConnectionKey;
use relay_core::topic::matches as topic_matches;
use serde_json::Value;

use crate::transport::{Transport, TransportError};

/// One connected client.
///
/// The public `id` may be reassigned at any time; [`key`](Self::key) never
/// changes and identifies the connection for removal.
pub struct Connection {
    key: ConnectionKey,
    id: RwLock<String>,
    topics: RwLock<HashSet<String>>,
    transport: Box<dyn Transport>,
    bearer_token: Option<String>,
    connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl Connection {
    /// Create a connection, optionally pre-subscribed to `topic`.
    pub fn new(transport: Box<dyn Transport>, id: impl Into<String>, topic: Option<&str>) -> Self {
        let topics = topic
            .filter(|t| !t.is_empty())
            .map(|t| HashSet::from([t.to_string()]))
            .unwrap_or_default();
        Self {
            key: ConnectionKey::new(),
            id: RwLock::new(id.into()),
            topics: RwLock::new(topics),
            transport,
            bearer_token: None,
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Attach the bearer token presented on the upgrade request.
    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    /// Bearer token the client connected with, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    /// Stable internal identity.
    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    /// Current public id.
    pub fn id(&self) -> String {
        self.id.read().clone()
    }

    /// Whether the current public id equals `id`.
    pub fn has_id(&self, id: &str) -> bool {
        *self.id.read() == id
    }

    /// Replace the public id, returning the previous one.
    pub fn set_id(&self, id: impl Into<String>) -> String {
        std::mem::replace(&mut *self.id.write(), id.into())
    }

    /// Snapshot of subscribed patterns, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.read().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Whether `pattern` is in the subscription set.
    pub fn is_subscribed(&self, pattern: &str) -> bool {
        self.topics.read().contains(pattern)
    }

    /// Add a pattern. Returns `false` if it was already present.
    pub fn subscribe(&self, pattern: &str) -> bool {
        self.topics.write().insert(pattern.to_string())
    }

    /// Remove a pattern. Returns `false` if it was not present.
    pub fn unsubscribe(&self, pattern: &str) -> bool {
        self.topics.write().remove(pattern)
    }

    /// Whether any subscribed pattern matches `topic`.
    pub fn matches(&self, topic: &str) -> bool {
        topic_matches(topic, self.topics.read().iter())
    }

    /// Complete the transport handshake.
    pub async fn accept(&self) -> Result<(), TransportError> {
        self.transport.accept().await
    }

    /// Send a pre-encoded text frame.
    ///
    /// Failures are counted in [`drop_count`](Self::drop_count).
    pub async fn send_text(&self, text: Arc<String>) -> Result<(), TransportError> {
        let result = self.transport.send_text(text).await;
        if result.is_err() {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Encode `value` and send it.
    pub async fn send_json(&self, value: &Value) -> Result<(), TransportError> {
        self.send_text(Arc::new(value.to_string())).await
    }

    /// Close the transport with `code`.
    pub async fn close(&self, code: u16) -> Result<(), TransportError> {
        self.transport.close(code).await
    }

    /// Frames that could not be handed to the transport.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Time since the connection was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("id", &*self.id.read())
            .field("topics", &*self.topics.read())
            .finish_non_exhaustive()
    }
}
