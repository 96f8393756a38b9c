use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};
use worklink_db::models::{Channel, NotificationPreference};
use worklink_services::dao::preference::PreferenceUpdate;

#[derive(Debug, Serialize)]
pub struct PreferenceResponse {
    pub in_app_enabled: bool,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub sms_enabled: bool,
    pub quiet_hours: serde_json::Value,
    pub email_digest: serde_json::Value,
    pub type_preferences: serde_json::Value,
    pub updated_at: String,
}

fn to_response(p: NotificationPreference) -> PreferenceResponse {
    PreferenceResponse {
        in_app_enabled: p.in_app_enabled,
        email_enabled: p.email_enabled,
        push_enabled: p.push_enabled,
        sms_enabled: p.sms_enabled,
        quiet_hours: serde_json::to_value(&p.quiet_hours).unwrap_or_default(),
        email_digest: serde_json::to_value(&p.email_digest).unwrap_or_default(),
        type_preferences: serde_json::to_value(&p.type_preferences).unwrap_or_default(),
        updated_at: p.updated_at.try_to_rfc3339_string().unwrap_or_default(),
    }
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PreferenceResponse>, ApiError> {
    let prefs = state.preferences.get_or_create(auth.user_id).await?;
    Ok(Json(to_response(prefs)))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<PreferenceUpdate>,
) -> Result<Json<PreferenceResponse>, ApiError> {
    if let Some(ref quiet) = body.quiet_hours {
        validate_quiet_hours(quiet)?;
    }
    if let Some(ref overrides) = body.type_preferences {
        for type_key in overrides.keys() {
            if worklink_db::models::NotificationType::parse(type_key).is_none() {
                return Err(ApiError::Validation(format!(
                    "Unknown notification type '{type_key}'"
                )));
            }
        }
    }
    let prefs = state.preferences.update(auth.user_id, body).await?;
    Ok(Json(to_response(prefs)))
}

pub async fn reset(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PreferenceResponse>, ApiError> {
    let prefs = state.preferences.reset_to_defaults(auth.user_id).await?;
    Ok(Json(to_response(prefs)))
}

fn validate_quiet_hours(quiet: &worklink_db::models::QuietHours) -> Result<(), ApiError> {
    for (label, value) in [("start", &quiet.start), ("end", &quiet.end)] {
        if chrono::NaiveTime::parse_from_str(value, "%H:%M").is_err() {
            return Err(ApiError::Validation(format!(
                "quiet_hours.{label} must be HH:MM, got '{value}'"
            )));
        }
    }
    if quiet.timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(ApiError::Validation(format!(
            "Unknown timezone '{}'",
            quiet.timezone
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeParams {
    /// "email" or "sms"; defaults to email, matching the links in mails.
    pub channel: Option<String>,
}

/// Public one-click unsubscribe, reached from email footers. No auth; the
/// token is the credential.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(params): Query<UnsubscribeParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let channel = match params.channel.as_deref() {
        None | Some("email") => Channel::Email,
        Some("sms") => Channel::Sms,
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "Channel '{other}' does not support unsubscribe links"
            )));
        }
    };

    state.preferences.unsubscribe(&token, channel).await?;
    Ok(Json(serde_json::json!({
        "unsubscribed": true,
        "channel": channel.as_str(),
    })))
}
