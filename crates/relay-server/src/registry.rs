//! Registry of live connections.
//!
//! Registration order is preserved. Fan-out works on a snapshot taken under
//! the read lock, so a dispatch never observes a half-registered connection
//! and never holds the lock across an await.

use std::sync::Arc;

use parking_lot::RwLock;
use relay_core::ids::ConnectionKey;

use crate::connection::Connection;

/// Ordered set of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection.
    pub fn add(&self, connection: Arc<Connection>) {
        self.connections.write().push(connection);
    }

    /// Remove the connection with `key`. Returns `false` if it was absent.
    pub fn remove(&self, key: ConnectionKey) -> bool {
        let mut connections = self.connections.write();
        let before = connections.len();
        connections.retain(|c| c.key() != key);
        connections.len() != before
    }

    /// Remove and return every connection.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        std::mem::take(&mut *self.connections.write())
    }

    /// Current connections in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().clone()
    }

    /// First connection whose public id is `id`.
    pub fn find_by_id(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.read().iter().find(|c| c.has_id(id)).cloned()
    }

    /// Whether a connection with `key` is registered.
    pub fn contains(&self, key: ConnectionKey) -> bool {
        self.connections.read().iter().any(|c| c.key() == key)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use std::time::Duration;

    fn conn(id: &str) -> Arc<Connection> {
        let (transport, _rx) = ChannelTransport::channel(1, Duration::from_millis(10));
        Arc::new(Connection::new(Box::new(transport), id, None))
    }

    #[test]
    fn add_and_remove() {
        let registry = ConnectionRegistry::new();
        let a = conn("a");
        let b = conn("b");
        registry.add(a.clone());
        registry.add(b.clone());
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a.key()));

        assert!(registry.remove(a.key()));
        assert!(!registry.remove(a.key()));
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(a.key()));
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let registry = ConnectionRegistry::new();
        for id in ["a", "b", "c"] {
            registry.add(conn(id));
        }
        let ids: Vec<String> = registry.snapshot().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let registry = ConnectionRegistry::new();
        registry.add(conn("a"));
        let snapshot = registry.snapshot();
        registry.add(conn("b"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_by_identity_not_id() {
        let registry = ConnectionRegistry::new();
        let first = conn("same");
        let second = conn("same");
        registry.add(first.clone());
        registry.add(second.clone());

        assert!(registry.remove(first.key()));
        let remaining = registry.snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key(), second.key());
    }

    #[test]
    fn find_by_id_follows_renames() {
        let registry = ConnectionRegistry::new();
        let a = conn("a");
        registry.add(a.clone());
        let _ = a.set_id("renamed");
        assert!(registry.find_by_id("a").is_none());
        assert_eq!(registry.find_by_id("renamed").unwrap().key(), a.key());
    }

    #[test]
    fn drain_empties_registry() {
        let registry = ConnectionRegistry::new();
        registry.add(conn("a"));
        registry.add(conn("b"));
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }
}
