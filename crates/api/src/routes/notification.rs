use axum::{
    Json,
    extract::{Path, Query, State},
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};
use worklink_db::models::{Channel, Notification, NotificationType};
use worklink_services::notify::orchestrator::SendResult;

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    /// Target user; defaults to the caller when absent.
    pub user_id: Option<String>,
    pub notification_type: String,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Explicit channel override; preferences decide when absent.
    pub channels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub notification_type: Option<String>,
    pub is_read: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: String,
    pub notification_type: String,
    pub payload: serde_json::Value,
    pub deliveries: Vec<DeliveryResponse>,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub channel: String,
    pub status: String,
    pub delivered_at: Option<String>,
}

fn to_response(n: Notification) -> NotificationResponse {
    NotificationResponse {
        id: n.id.map(|id| id.to_hex()).unwrap_or_default(),
        notification_type: n.notification_type.as_str().to_string(),
        payload: serde_json::to_value(&n.payload).unwrap_or_default(),
        deliveries: n
            .deliveries
            .into_iter()
            .map(|d| DeliveryResponse {
                channel: d.channel.as_str().to_string(),
                status: match d.status {
                    worklink_db::models::DeliveryStatus::Pending => "pending".to_string(),
                    worklink_db::models::DeliveryStatus::Sent => "sent".to_string(),
                    worklink_db::models::DeliveryStatus::Failed => "failed".to_string(),
                },
                delivered_at: d.delivered_at.and_then(|t| t.try_to_rfc3339_string().ok()),
            })
            .collect(),
        is_read: n.is_read,
        read_at: n.read_at.and_then(|t| t.try_to_rfc3339_string().ok()),
        failure_reason: n.failure_reason,
        created_at: n.created_at.try_to_rfc3339_string().unwrap_or_default(),
    }
}

fn parse_type(s: &str) -> Result<NotificationType, ApiError> {
    NotificationType::parse(s)
        .ok_or_else(|| ApiError::Validation(format!("Unknown notification type '{s}'")))
}

pub async fn send(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendNotificationRequest>,
) -> Result<Json<SendResult>, ApiError> {
    let user_id = match body.user_id {
        Some(ref raw) => ObjectId::parse_str(raw)
            .map_err(|_| ApiError::BadRequest("Invalid user_id".to_string()))?,
        None => auth.user_id,
    };
    let notification_type = parse_type(&body.notification_type)?;

    let channels = body
        .channels
        .map(|list| {
            list.iter()
                .map(|c| {
                    Channel::parse(c)
                        .ok_or_else(|| ApiError::Validation(format!("Unknown channel '{c}'")))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let payload = bson::to_document(&body.payload)
        .map_err(|e| ApiError::Validation(format!("Invalid payload: {e}")))?;

    let result = state
        .notify
        .send(user_id, notification_type, payload, channels)
        .await?;
    Ok(Json(result))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let type_filter = params
        .notification_type
        .as_deref()
        .map(parse_type)
        .transpose()?;

    let pagination = super::pagination(params.page, params.per_page)?;
    let result = state
        .notify
        .list(auth.user_id, type_filter, params.is_read, &pagination)
        .await?;

    let items: Vec<NotificationResponse> = result.items.into_iter().map(to_response).collect();

    Ok(Json(serde_json::json!({
        "items": items,
        "total": result.total,
        "page": result.page,
        "per_page": result.per_page,
        "total_pages": result.total_pages,
    })))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let id = ObjectId::parse_str(&notification_id)
        .map_err(|_| ApiError::BadRequest("Invalid notification_id".to_string()))?;
    let notification = state.notify.get(id, auth.user_id).await?;
    Ok(Json(to_response(notification)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.notify.unread_count(auth.user_id).await?;
    Ok(Json(serde_json::json!({ "unread_count": count })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = ObjectId::parse_str(&notification_id)
        .map_err(|_| ApiError::BadRequest("Invalid notification_id".to_string()))?;
    let unread = state.notify.mark_read(id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "unread_count": unread })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let unread = state.notify.mark_all_read(auth.user_id).await?;
    Ok(Json(serde_json::json!({ "unread_count": unread })))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = ObjectId::parse_str(&notification_id)
        .map_err(|_| ApiError::BadRequest("Invalid notification_id".to_string()))?;
    state.notify.delete(id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
