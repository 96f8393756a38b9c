//! Cross-instance delivery of realtime events.
//!
//! The session registry only knows about connections on this process. In a
//! multi-instance deployment every live event is also published on a Redis
//! channel; each instance forwards foreign events into its own registry and
//! skips its own by instance id.

use std::sync::Arc;

use bson::oid::ObjectId;
use futures::StreamExt;
use nanoid::nanoid;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::session::SessionRegistry;

const EVENTS_CHANNEL: &str = "notify:events";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    instance: String,
    user_id: String,
    event: serde_json::Value,
}

/// Fans live events out to local sessions and, when configured, to peer
/// instances via Redis pub/sub.
pub struct LiveEvents {
    sessions: Arc<SessionRegistry>,
    publisher: Option<redis::aio::ConnectionManager>,
    instance_id: String,
}

impl LiveEvents {
    pub fn local_only(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            sessions,
            publisher: None,
            instance_id: nanoid!(12),
        }
    }

    pub async fn with_redis(
        sessions: Arc<SessionRegistry>,
        redis_url: &str,
    ) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let publisher = redis::aio::ConnectionManager::new(client.clone()).await?;
        let instance_id = nanoid!(12);

        tokio::spawn(subscriber_loop(
            client,
            sessions.clone(),
            instance_id.clone(),
        ));

        info!(instance = %instance_id, "Redis fan-out enabled");
        Ok(Self {
            sessions,
            publisher: Some(publisher),
            instance_id,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Delivers to local sessions and publishes for peers. Returns the number
    /// of local connections reached.
    pub async fn publish(&self, user_id: &ObjectId, event: &serde_json::Value) -> usize {
        let delivered = self.sessions.send_to_user(user_id, event);

        if let Some(publisher) = &self.publisher {
            let envelope = Envelope {
                instance: self.instance_id.clone(),
                user_id: user_id.to_hex(),
                event: event.clone(),
            };
            match serde_json::to_string(&envelope) {
                Ok(payload) => {
                    let mut conn = publisher.clone();
                    if let Err(e) = conn.publish::<_, _, ()>(EVENTS_CHANNEL, payload).await {
                        warn!(%e, "Failed to publish live event to Redis");
                    }
                }
                Err(e) => warn!(%e, "Failed to serialize live event envelope"),
            }
        }

        delivered
    }
}

async fn subscriber_loop(
    client: redis::Client,
    sessions: Arc<SessionRegistry>,
    instance_id: String,
) {
    loop {
        match client.get_async_pubsub().await {
            Ok(mut pubsub) => {
                if let Err(e) = pubsub.subscribe(EVENTS_CHANNEL).await {
                    warn!(%e, "Redis subscribe failed");
                } else {
                    let mut stream = pubsub.on_message();
                    while let Some(msg) = stream.next().await {
                        let payload: String = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(%e, "Unreadable fan-out payload");
                                continue;
                            }
                        };
                        let Ok(envelope) = serde_json::from_str::<Envelope>(&payload) else {
                            warn!("Malformed fan-out envelope");
                            continue;
                        };
                        if envelope.instance == instance_id {
                            continue;
                        }
                        let Ok(user_id) = ObjectId::parse_str(&envelope.user_id) else {
                            continue;
                        };
                        let delivered = sessions.send_to_user(&user_id, &envelope.event);
                        debug!(%user_id, delivered, "Forwarded fan-out event");
                    }
                }
            }
            Err(e) => warn!(%e, "Redis pub/sub connection failed"),
        }

        // Connection dropped; back off before reconnecting.
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
}
