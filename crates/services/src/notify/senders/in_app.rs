use std::sync::Arc;

use bson::oid::ObjectId;
use serde_json::json;
use worklink_db::models::{Notification, NotificationType};

use super::SendOutcome;
use crate::notify::fanout::LiveEvents;

/// Pushes notification events onto the user's live realtime connections.
/// The stored record is the source of truth; this is the "new notification"
/// nudge for clients that are currently connected.
pub struct InAppSender {
    events: Arc<LiveEvents>,
}

impl InAppSender {
    pub fn new(events: Arc<LiveEvents>) -> Self {
        Self { events }
    }

    /// No live session is not a failure; the record stays pending and the
    /// client picks it up on its next list fetch.
    pub async fn send(
        &self,
        notification: &Notification,
        rendered_body: Option<&str>,
        unread_count: u64,
    ) -> SendOutcome {
        let event = json!({
            "type": "notification",
            "notification": {
                "id": notification.id.map(|id| id.to_hex()),
                "notification_type": notification.notification_type.as_str(),
                "body": rendered_body,
                "payload": serde_json::to_value(&notification.payload).unwrap_or_default(),
                "is_read": notification.is_read,
                "created_at": notification.created_at.try_to_rfc3339_string().ok(),
            },
            "unread_count": unread_count,
        });

        let delivered = self.events.publish(&notification.user_id, &event).await;
        if delivered > 0 {
            SendOutcome::Sent {
                provider_message_id: None,
            }
        } else {
            SendOutcome::Deferred
        }
    }

    /// Read-state change events, so open clients keep their badge in sync.
    pub async fn publish_unread_count(&self, user_id: &ObjectId, unread_count: u64) -> usize {
        self.events
            .publish(user_id, &json!({ "type": "unread_count", "unread_count": unread_count }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::session::SessionRegistry;
    use tokio::sync::mpsc;
    use worklink_db::models::ChannelDelivery;

    fn notification(user_id: ObjectId) -> Notification {
        Notification {
            id: Some(ObjectId::new()),
            user_id,
            notification_type: NotificationType::NewMessage,
            payload: bson::doc! { "sender_name": "Ana" },
            deliveries: vec![ChannelDelivery::pending(
                worklink_db::models::Channel::InApp,
            )],
            is_read: false,
            read_at: None,
            failure_reason: None,
            retry_count: 0,
            created_at: bson::DateTime::now(),
        }
    }

    #[tokio::test]
    async fn live_session_receives_the_event() {
        let registry = Arc::new(SessionRegistry::new());
        let sender = InAppSender::new(Arc::new(LiveEvents::local_only(registry.clone())));
        let user = ObjectId::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(user, "c1".into(), tx);

        let outcome = sender.send(&notification(user), Some("Ana sent you a message."), 5).await;
        assert!(matches!(outcome, SendOutcome::Sent { .. }));

        let event = rx.recv().await.unwrap();
        assert_eq!(event["type"], "notification");
        assert_eq!(event["unread_count"], 5);
        assert_eq!(event["notification"]["body"], "Ana sent you a message.");
    }

    #[tokio::test]
    async fn no_session_defers() {
        let registry = Arc::new(SessionRegistry::new());
        let sender = InAppSender::new(Arc::new(LiveEvents::local_only(registry)));

        let outcome = sender.send(&notification(ObjectId::new()), None, 1).await;
        assert_eq!(outcome, SendOutcome::Deferred);
    }
}
