//! Connection Registry
//!
//! Live directory of peer identifier -> connection handle. Lookups and counts
//! take a shared lock; register and unregister take it exclusively. No lock
//! is held across an await point.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::handle::ConnectionHandle;

/// Identifier -> handle directory shared by all connection tasks
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `peer_id`, replacing any previous entry
    ///
    /// The replaced handle is returned detached but still open; closing it
    /// stays with whoever owns it.
    pub fn register(
        &self,
        peer_id: impl Into<String>,
        handle: Arc<ConnectionHandle>,
    ) -> Option<Arc<ConnectionHandle>> {
        let peer_id = peer_id.into();
        let mut entries = self.entries.write();
        let previous = entries.insert(peer_id, handle);
        if let Some(previous) = &previous {
            debug!(connection_id = %previous.id(), peer_id = previous.peer_id(), "Detached previous registration");
        }
        previous
    }

    /// Find the handle currently registered under `peer_id`
    pub fn lookup(&self, peer_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.entries.read().get(peer_id).cloned()
    }

    /// Remove `peer_id` only while it still maps to `handle`
    ///
    /// Returns whether an entry was removed. A stale handle whose identifier
    /// has since been taken over by a newer connection removes nothing.
    pub fn unregister(&self, peer_id: &str, handle: &ConnectionHandle) -> bool {
        let mut entries = self.entries.write();
        match entries.get(peer_id) {
            Some(current) if current.same_connection(handle) => {
                entries.remove(peer_id);
                true
            }
            _ => false,
        }
    }

    /// Number of registered identifiers
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Snapshot of registered identifiers
    pub fn peer_ids(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let (handle, _queue) = ConnectionHandle::channel("alice", 4);

        assert!(registry.register("alice", Arc::clone(&handle)).is_none());

        let found = registry.lookup("alice").unwrap();
        assert!(found.same_connection(&handle));
        assert!(registry.lookup("bob").is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_second_registration_overwrites_without_closing() {
        let registry = ConnectionRegistry::new();
        let (first, _q1) = ConnectionHandle::channel("alice", 4);
        let (second, _q2) = ConnectionHandle::channel("alice", 4);

        registry.register("alice", Arc::clone(&first));
        let replaced = registry.register("alice", Arc::clone(&second)).unwrap();

        assert!(replaced.same_connection(&first));
        assert!(registry.lookup("alice").unwrap().same_connection(&second));
        assert!(!first.is_closed());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_stale_unregister_is_noop() {
        let registry = ConnectionRegistry::new();
        let (first, _q1) = ConnectionHandle::channel("alice", 4);
        let (second, _q2) = ConnectionHandle::channel("alice", 4);

        registry.register("alice", Arc::clone(&first));
        registry.register("alice", Arc::clone(&second));

        assert!(!registry.unregister("alice", &first));
        assert!(registry.lookup("alice").unwrap().same_connection(&second));

        assert!(registry.unregister("alice", &second));
        assert!(registry.lookup("alice").is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_unregister_unknown_identifier() {
        let registry = ConnectionRegistry::new();
        let (handle, _queue) = ConnectionHandle::channel("ghost", 4);

        assert!(!registry.unregister("ghost", &handle));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_independent_registries() {
        let left = ConnectionRegistry::new();
        let right = ConnectionRegistry::new();
        let (handle, _queue) = ConnectionHandle::channel("alice", 4);

        left.register("alice", handle);

        assert_eq!(left.count(), 1);
        assert_eq!(right.count(), 0);
        assert_eq!(left.peer_ids(), vec!["alice".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_unregister_lookup() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();

        for i in 0..64 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let peer_id = format!("peer-{}", i);
                let (handle, queue) = ConnectionHandle::channel(peer_id.clone(), 4);

                for _ in 0..50 {
                    registry.register(peer_id.clone(), Arc::clone(&handle));
                    assert!(registry.lookup(&peer_id).is_some());
                    assert!(registry.unregister(&peer_id, &handle));
                    tokio::task::yield_now().await;
                }

                // Odd peers stay registered
                if i % 2 == 1 {
                    registry.register(peer_id, handle);
                }
                queue
            }));
        }

        let mut queues = Vec::new();
        for task in tasks {
            queues.push(task.await.unwrap());
        }

        let expected: HashSet<String> = (0..64)
            .filter(|i| i % 2 == 1)
            .map(|i| format!("peer-{}", i))
            .collect();
        let actual: HashSet<String> = registry.peer_ids().into_iter().collect();

        assert_eq!(registry.count(), 32);
        assert_eq!(actual, expected);
    }
}
