//! Routed messages and their flat wire envelope.
//!
//! On the wire a message is a single JSON object: the routing keys `type`,
//! `topic`, and `conn_id` sit next to the application fields. In memory the
//! routing keys are lifted into [`Message`] and the remaining fields are kept
//! untouched in [`Message::data`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{EnvelopeError, Result};

/// Key holding the routing type.
pub const TYPE_KEY: &str = "type";
/// Key holding the topic.
pub const TOPIC_KEY: &str = "topic";
/// Key holding the target connection id(s).
pub const CONN_ID_KEY: &str = "conn_id";

// ─────────────────────────────────────────────────────────────────────────────
// MessageType
// ─────────────────────────────────────────────────────────────────────────────

/// Routing type of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Initial handshake notice from a client.
    Connect,
    /// Server-issued identity reassignment.
    SetConnId,
    /// Add a topic pattern to the sending connection.
    Subscribe,
    /// Remove a topic pattern from the sending connection.
    Unsubscribe,
    /// Deliver to every connection.
    Broadcast,
    /// Deliver to connections subscribed to a matching pattern.
    Send,
    /// Deliver to connections by id.
    SendByConnId,
}

impl MessageType {
    /// Every known type.
    pub const ALL: [Self; 7] = [
        Self::Connect,
        Self::SetConnId,
        Self::Subscribe,
        Self::Unsubscribe,
        Self::Broadcast,
        Self::Send,
        Self::SendByConnId,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::SetConnId => "set_conn_id",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Broadcast => "broadcast",
            Self::Send => "send",
            Self::SendByConnId => "send_by_conn_id",
        }
    }

    /// Types only the server may emit.
    pub fn is_server_only(self) -> bool {
        matches!(self, Self::SetConnId)
    }

    /// Types that are valid without a topic.
    pub fn allows_missing_topic(self) -> bool {
        matches!(
            self,
            Self::Connect | Self::SetConnId | Self::Broadcast | Self::SendByConnId
        )
    }

    /// Types that must carry a connection id.
    pub fn requires_conn_id(self) -> bool {
        matches!(self, Self::SetConnId | Self::SendByConnId)
    }

    /// Subscription control types, handled locally and never published.
    pub fn is_subscription(self) -> bool {
        matches!(self, Self::Subscribe | Self::Unsubscribe)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EnvelopeError::InvalidType(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnTarget
// ─────────────────────────────────────────────────────────────────────────────

/// One connection id, or several.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnTarget {
    /// A single id. Delivery stops at the first match.
    One(String),
    /// A list of ids. Every matching connection receives the message.
    Many(Vec<String>),
}

impl ConnTarget {
    /// Whether `id` is addressed by this target.
    pub fn contains(&self, id: &str) -> bool {
        match self {
            Self::One(target) => target == id,
            Self::Many(targets) => targets.iter().any(|t| t == id),
        }
    }

    /// Whether delivery should stop after the first match.
    pub fn is_single(&self) -> bool {
        matches!(self, Self::One(_))
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::One(id) => id.is_empty(),
            Self::Many(ids) => ids.is_empty(),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::One(id) => Value::String(id),
            Self::Many(ids) => Value::Array(ids.into_iter().map(Value::String).collect()),
        }
    }
}

impl From<&str> for ConnTarget {
    fn from(id: &str) -> Self {
        Self::One(id.to_string())
    }
}

impl From<String> for ConnTarget {
    fn from(id: String) -> Self {
        Self::One(id)
    }
}

impl From<Vec<String>> for ConnTarget {
    fn from(ids: Vec<String>) -> Self {
        Self::Many(ids)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// A routed message with its routing keys lifted out of the payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Routing type.
    pub kind: MessageType,
    /// Topic, when the type carries one.
    pub topic: Option<String>,
    /// Target connection id(s) for id-addressed types.
    pub conn_id: Option<ConnTarget>,
    /// Application fields, opaque to routing.
    pub data: Map<String, Value>,
}

impl Message {
    /// Message of `kind` with no topic, no target, and the given data.
    pub fn new(kind: MessageType, data: Map<String, Value>) -> Self {
        Self {
            kind,
            topic: None,
            conn_id: None,
            data,
        }
    }

    /// Set the topic.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the connection target.
    #[must_use]
    pub fn with_conn_id(mut self, conn_id: impl Into<ConnTarget>) -> Self {
        self.conn_id = Some(conn_id.into());
        self
    }

    /// Validate a client payload and lift its routing keys.
    pub fn from_client_payload(payload: Value) -> Result<Self> {
        validate(&payload)?;
        untag(payload)
    }

    /// Flatten back into the wire envelope.
    ///
    /// Absent routing keys are written as `null`.
    pub fn into_envelope(self) -> Value {
        let mut map = self.data;
        let _ = map.insert(TYPE_KEY.to_string(), Value::String(self.kind.to_string()));
        let _ = map.insert(
            TOPIC_KEY.to_string(),
            self.topic.map_or(Value::Null, Value::String),
        );
        let _ = map.insert(
            CONN_ID_KEY.to_string(),
            self.conn_id.map_or(Value::Null, ConnTarget::into_value),
        );
        Value::Object(map)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelope operations
// ─────────────────────────────────────────────────────────────────────────────

/// Add routing keys to an outbound payload.
///
/// `topic`, when supplied, overrides any topic already in the payload. If the
/// payload has no `type`, it becomes `send` when a topic is present and
/// `broadcast` otherwise. Missing `topic` and `conn_id` keys are written as
/// `null`.
pub fn tag(mut payload: Map<String, Value>, topic: Option<&str>) -> Map<String, Value> {
    if let Some(topic) = topic {
        let _ = payload.insert(TOPIC_KEY.to_string(), Value::String(topic.to_string()));
    }

    let has_type = payload.get(TYPE_KEY).is_some_and(|v| !v.is_null());
    if !has_type {
        let has_topic = matches!(payload.get(TOPIC_KEY), Some(Value::String(t)) if !t.is_empty());
        let kind = if has_topic {
            MessageType::Send
        } else {
            MessageType::Broadcast
        };
        let _ = payload.insert(TYPE_KEY.to_string(), Value::String(kind.to_string()));
    }

    let _ = payload.entry(TOPIC_KEY).or_insert(Value::Null);
    let _ = payload.entry(CONN_ID_KEY).or_insert(Value::Null);
    payload
}

/// Split an envelope into its routing keys and remaining payload.
///
/// Accepts a decoded object, or a JSON string holding one. Any known type is
/// accepted here, server-only ones included; client restrictions live in
/// [`validate`].
pub fn untag(raw: Value) -> Result<Message> {
    let mut map = match raw {
        Value::Object(map) => map,
        Value::String(text) => match serde_json::from_str(&text)? {
            Value::Object(map) => map,
            _ => return Err(EnvelopeError::NotAnObject),
        },
        _ => return Err(EnvelopeError::NotAnObject),
    };

    let kind = read_type(&map)?;
    let topic = read_topic(&map)?;
    let conn_id = read_conn_id(&map)?;

    let _ = map.remove(TYPE_KEY);
    let _ = map.remove(TOPIC_KEY);
    let _ = map.remove(CONN_ID_KEY);

    Ok(Message {
        kind,
        topic,
        conn_id,
        data: map,
    })
}

/// [`untag`] for a serialized envelope.
pub fn untag_slice(raw: &[u8]) -> Result<Message> {
    let value: Value = serde_json::from_slice(raw)?;
    untag(value)
}

/// Check that a client payload is allowed to enter the system.
///
/// The type must be known and client-permitted, a topic is required unless
/// the type is exempt, and id-addressed types must carry a non-empty target.
pub fn validate(payload: &Value) -> Result<()> {
    let Value::Object(map) = payload else {
        return Err(EnvelopeError::NotAnObject);
    };

    let kind = read_type(map)?;
    if kind.is_server_only() {
        return Err(EnvelopeError::InvalidType(kind.to_string()));
    }

    let topic = read_topic(map)?;
    if topic.as_deref().is_none_or(str::is_empty) && !kind.allows_missing_topic() {
        return Err(EnvelopeError::MissingTopic(kind));
    }

    let conn_id = read_conn_id(map)?;
    if kind.requires_conn_id() && conn_id.as_ref().is_none_or(ConnTarget::is_empty) {
        return Err(EnvelopeError::MissingConnId(kind));
    }

    Ok(())
}

fn read_type(map: &Map<String, Value>) -> Result<MessageType> {
    match map.get(TYPE_KEY) {
        None | Some(Value::Null) => Err(EnvelopeError::MissingField(TYPE_KEY)),
        Some(Value::String(kind)) => kind.parse(),
        Some(other) => Err(EnvelopeError::InvalidType(other.to_string())),
    }
}

fn read_topic(map: &Map<String, Value>) -> Result<Option<String>> {
    match map.get(TOPIC_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(topic)) => Ok(Some(topic.clone())),
        Some(_) => Err(EnvelopeError::InvalidField {
            field: TOPIC_KEY,
            reason: "must be a string",
        }),
    }
}

fn read_conn_id(map: &Map<String, Value>) -> Result<Option<ConnTarget>> {
    const REASON: &str = "must be a string or a list of strings";
    match map.get(CONN_ID_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(ConnTarget::One(id.clone()))),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(id) => Ok(id.clone()),
                _ => Err(EnvelopeError::InvalidField {
                    field: CONN_ID_KEY,
                    reason: REASON,
                }),
            })
            .collect::<Result<Vec<_>>>()
            .map(|ids| Some(ConnTarget::Many(ids))),
        Some(_) => Err(EnvelopeError::InvalidField {
            field: CONN_ID_KEY,
            reason: REASON,
        }),
    }
}
