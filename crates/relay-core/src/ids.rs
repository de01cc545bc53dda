//! Connection identifiers.
//!
//! Two kinds of id exist per connection: the public, reassignable `conn_id`
//! that clients address messages to, and an internal [`ConnectionKey`] that
//! never changes and is used to remove a connection by identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix for generated public connection ids.
pub const CONN_ID_PREFIX: &str = "conn_";

/// Generate a public connection id (`conn_` + UUID v7).
pub fn generate_conn_id() -> String {
    format!("{CONN_ID_PREFIX}{}", Uuid::now_v7().simple())
}

/// Stable internal identity of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionKey(Uuid);

impl ConnectionKey {
    /// Create a new time-ordered key.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
