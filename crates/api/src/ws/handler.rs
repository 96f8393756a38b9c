use axum::{
    extract::{Query, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    response::Response,
};
use bson::oid::ObjectId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    // Verify JWT before accepting the WebSocket
    let claims = match state.auth.verify_access_token(&params.token) {
        Ok(c) => c,
        Err(_) => {
            return Response::builder()
                .status(401)
                .body("Unauthorized".into())
                .unwrap();
        }
    };

    let user_id = match ObjectId::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            return Response::builder()
                .status(400)
                .body("Invalid user ID".into())
                .unwrap();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: ObjectId) {
    let connection_id = Uuid::new_v4().to_string();
    info!(%user_id, %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();

    state.sessions.register(user_id, connection_id.clone(), tx);

    // Initial state: connected ack with the current unread count.
    let unread = state
        .notify
        .unread_count(user_id)
        .await
        .unwrap_or_default();
    let hello = serde_json::json!({
        "type": "connected",
        "user_id": user_id.to_hex(),
        "unread_count": unread,
    });
    if let Ok(text) = serde_json::to_string(&hello) {
        let _ = sender.send(Message::text(text)).await;
    }

    // Forward queued events onto the wire.
    let mut forward = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut forward => break,
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, &user_id, &connection_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(%user_id, %connection_id, %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    forward.abort();
    state.sessions.unregister(&user_id, &connection_id);
    info!(%user_id, %connection_id, "WebSocket disconnected");
}

async fn handle_client_message(
    state: &AppState,
    user_id: &ObjectId,
    connection_id: &str,
    text: &str,
) {
    let parsed: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return,
    };

    let msg_type = parsed.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let data = parsed.get("data");

    debug!(%user_id, %connection_id, msg_type, "WS message received");

    match msg_type {
        "ping" => {
            let pong = serde_json::json!({ "type": "pong" });
            state.sessions.send_to_connection(user_id, connection_id, &pong);
        }
        "mark_read" => {
            let Some(id_str) = data.and_then(|d| d.get("notification_id")).and_then(|v| v.as_str())
            else {
                return;
            };
            let Ok(id) = ObjectId::parse_str(id_str) else {
                return;
            };
            // mark_read publishes the fresh unread count to every session.
            if let Err(e) = state.notify.mark_read(id, *user_id).await {
                debug!(%user_id, %e, "mark_read over WS failed");
            }
        }
        "mark_all_read" => {
            if let Err(e) = state.notify.mark_all_read(*user_id).await {
                debug!(%user_id, %e, "mark_all_read over WS failed");
            }
        }
        _ => {
            debug!(%user_id, msg_type, "Unknown WS message type");
        }
    }
}
