use axum::{
    Json,
    extract::{Path, State},
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};
use worklink_db::models::{DeviceToken, Platform};
use worklink_services::dao::device_token::{TokenMetadata, TokenStats};

#[derive(Debug, Deserialize)]
pub struct RegisterTokenRequest {
    pub platform: String,
    pub token: String,
    pub device_model: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceTokenResponse {
    pub id: String,
    pub platform: String,
    pub token: String,
    pub device_model: Option<String>,
    pub is_active: bool,
    pub last_used_at: String,
}

fn to_response(t: DeviceToken) -> DeviceTokenResponse {
    DeviceTokenResponse {
        id: t.id.map(|id| id.to_hex()).unwrap_or_default(),
        platform: t.platform.as_str().to_string(),
        token: t.token,
        device_model: t.device_model,
        is_active: t.is_active,
        last_used_at: t.last_used_at.try_to_rfc3339_string().unwrap_or_default(),
    }
}

pub async fn register(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<RegisterTokenRequest>,
) -> Result<Json<DeviceTokenResponse>, ApiError> {
    let platform = match body.platform.as_str() {
        "ios" => Platform::Ios,
        "android" => Platform::Android,
        other => {
            return Err(ApiError::Validation(format!("Unknown platform '{other}'")));
        }
    };
    if body.token.is_empty() {
        return Err(ApiError::Validation("token must not be empty".to_string()));
    }

    let registered = state
        .device_tokens
        .register(
            auth.user_id,
            platform,
            &body.token,
            TokenMetadata {
                device_model: body.device_model,
                os_version: body.os_version,
                app_version: body.app_version,
            },
        )
        .await?;
    Ok(Json(to_response(registered)))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<DeviceTokenResponse>>, ApiError> {
    let tokens = state.device_tokens.find_active(auth.user_id).await?;
    Ok(Json(tokens.into_iter().map(to_response).collect()))
}

pub async fn stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<TokenStats>, ApiError> {
    let stats = state.device_tokens.stats(auth.user_id).await?;
    Ok(Json(stats))
}

pub async fn deactivate(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(token_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = ObjectId::parse_str(&token_id)
        .map_err(|_| ApiError::BadRequest("Invalid token_id".to_string()))?;
    state.device_tokens.deactivate(id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "deactivated": true })))
}

pub async fn deactivate_all(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.device_tokens.deactivate_all(auth.user_id).await?;
    Ok(Json(serde_json::json!({ "deactivated": count })))
}
