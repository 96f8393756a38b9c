use bson::oid::ObjectId;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Handle to one live realtime connection. The transport layer owns the
/// receiving half and forwards values onto the wire.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: String,
    tx: mpsc::UnboundedSender<serde_json::Value>,
}

/// Tracks live realtime connections by user id. A user can hold several
/// connections (tabs, devices). Process-local; cross-instance delivery goes
/// through the Redis fan-out.
pub struct SessionRegistry {
    connections: DashMap<ObjectId, Vec<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn register(
        &self,
        user_id: ObjectId,
        connection_id: String,
        tx: mpsc::UnboundedSender<serde_json::Value>,
    ) {
        self.connections
            .entry(user_id)
            .or_default()
            .push(Session { connection_id, tx });
    }

    pub fn unregister(&self, user_id: &ObjectId, connection_id: &str) {
        if let Some(mut sessions) = self.connections.get_mut(user_id) {
            sessions.retain(|s| s.connection_id != connection_id);
            if sessions.is_empty() {
                drop(sessions);
                self.connections.remove(user_id);
            }
        }
    }

    pub fn list_connections(&self, user_id: &ObjectId) -> Vec<String> {
        self.connections
            .get(user_id)
            .map(|s| s.iter().map(|s| s.connection_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Delivers an event to every live connection of the user; returns how
    /// many connections accepted it. Dead senders are dropped lazily on the
    /// next connect/disconnect.
    pub fn send_to_user(&self, user_id: &ObjectId, event: &serde_json::Value) -> usize {
        let Some(sessions) = self.connections.get(user_id) else {
            return 0;
        };
        sessions
            .iter()
            .filter(|s| s.tx.send(event.clone()).is_ok())
            .count()
    }

    /// Delivers an event to one specific connection of the user, e.g. a pong
    /// for that connection's ping. Returns whether it was accepted.
    pub fn send_to_connection(
        &self,
        user_id: &ObjectId,
        connection_id: &str,
        event: &serde_json::Value,
    ) -> bool {
        let Some(sessions) = self.connections.get(user_id) else {
            return false;
        };
        sessions
            .iter()
            .find(|s| s.connection_id == connection_id)
            .map(|s| s.tx.send(event.clone()).is_ok())
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|r| r.value().len()).sum()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delivers_to_all_connections_of_a_user() {
        let registry = SessionRegistry::new();
        let user = ObjectId::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(user, "c1".into(), tx1);
        registry.register(user, "c2".into(), tx2);

        let delivered = registry.send_to_user(&user, &json!({ "type": "notification" }));
        assert_eq!(delivered, 2);
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn no_connections_means_zero_delivered() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.send_to_user(&ObjectId::new(), &json!({ "type": "notification" })),
            0
        );
    }

    #[tokio::test]
    async fn unregister_removes_only_that_connection() {
        let registry = SessionRegistry::new();
        let user = ObjectId::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(user, "c1".into(), tx1);
        registry.register(user, "c2".into(), tx2);

        registry.unregister(&user, "c1");
        assert_eq!(registry.list_connections(&user), vec!["c2".to_string()]);

        let delivered = registry.send_to_user(&user, &json!({ "type": "unread_count" }));
        assert_eq!(delivered, 1);
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn send_to_connection_targets_only_that_session() {
        let registry = SessionRegistry::new();
        let user = ObjectId::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(user, "c1".into(), tx1);
        registry.register(user, "c2".into(), tx2);

        assert!(registry.send_to_connection(&user, "c2", &json!({ "type": "pong" })));
        assert!(rx2.recv().await.is_some());
        assert!(rx1.try_recv().is_err());

        assert!(!registry.send_to_connection(&user, "unknown", &json!({ "type": "pong" })));
    }

    #[tokio::test]
    async fn last_unregister_drops_the_user_entry() {
        let registry = SessionRegistry::new();
        let user = ObjectId::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(user, "c1".into(), tx);
        registry.unregister(&user, "c1");
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.list_connections(&user).is_empty());
    }
}
