use axum::{
    Json,
    extract::{Path, Query, State},
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};
use worklink_db::models::{NotificationTemplate, NotificationType};
use worklink_services::dao::template::{TemplateFields, TemplateFilter};

#[derive(Debug, Deserialize)]
pub struct UpsertTemplateRequest {
    pub notification_type: String,
    pub language: String,
    #[serde(flatten)]
    pub fields: TemplateFields,
}

#[derive(Debug, Deserialize)]
pub struct ListTemplateParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub notification_type: Option<String>,
    pub language: Option<String>,
    pub active_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub notification_type: String,
    pub language: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub id: String,
    pub notification_type: String,
    pub language: String,
    pub version: u32,
    pub is_active: bool,
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub push_title: Option<String>,
    pub push_body: Option<String>,
    pub sms_template: Option<String>,
    pub in_app_template: Option<String>,
    pub variables: serde_json::Value,
    pub updated_at: String,
}

fn to_response(t: NotificationTemplate) -> TemplateResponse {
    TemplateResponse {
        id: t.id.map(|id| id.to_hex()).unwrap_or_default(),
        notification_type: t.notification_type.as_str().to_string(),
        language: t.language,
        version: t.version,
        is_active: t.is_active,
        subject: t.subject,
        html_body: t.html_body,
        text_body: t.text_body,
        push_title: t.push_title,
        push_body: t.push_body,
        sms_template: t.sms_template,
        in_app_template: t.in_app_template,
        variables: serde_json::to_value(&t.variables).unwrap_or_default(),
        updated_at: t.updated_at.try_to_rfc3339_string().unwrap_or_default(),
    }
}

fn parse_type(s: &str) -> Result<NotificationType, ApiError> {
    NotificationType::parse(s)
        .ok_or_else(|| ApiError::Validation(format!("Unknown notification type '{s}'")))
}

pub async fn list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<ListTemplateParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let filter = TemplateFilter {
        notification_type: params
            .notification_type
            .as_deref()
            .map(parse_type)
            .transpose()?,
        language: params.language,
        active_only: params.active_only,
    };

    let pagination = super::pagination(params.page, params.per_page)?;
    let result = state.templates.list(&filter, &pagination).await?;
    let items: Vec<TemplateResponse> = result.items.into_iter().map(to_response).collect();

    Ok(Json(serde_json::json!({
        "items": items,
        "total": result.total,
        "page": result.page,
        "per_page": result.per_page,
        "total_pages": result.total_pages,
    })))
}

pub async fn list_by_type(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(type_name): Path<String>,
) -> Result<Json<Vec<TemplateResponse>>, ApiError> {
    let notification_type = parse_type(&type_name)?;
    let templates = state.templates.find_by_type(notification_type).await?;
    Ok(Json(templates.into_iter().map(to_response).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(template_id): Path<String>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let id = ObjectId::parse_str(&template_id)
        .map_err(|_| ApiError::BadRequest("Invalid template_id".to_string()))?;
    let template = state.templates.base.find_by_id(id).await?;
    Ok(Json(to_response(template)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTemplateRequest {
    #[serde(flatten)]
    pub fields: TemplateFields,
}

/// Versions are immutable; updating a template creates and activates the
/// next version of its (type, language) pair.
pub async fn update(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(template_id): Path<String>,
    Json(body): Json<UpdateTemplateRequest>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let id = ObjectId::parse_str(&template_id)
        .map_err(|_| ApiError::BadRequest("Invalid template_id".to_string()))?;
    let reference = state.templates.base.find_by_id(id).await?;
    let template = state
        .engine
        .upsert_template(reference.notification_type, &reference.language, body.fields)
        .await?;
    Ok(Json(to_response(template)))
}

/// Creates the next version for (type, language) and activates it.
pub async fn upsert(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(body): Json<UpsertTemplateRequest>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let notification_type = parse_type(&body.notification_type)?;
    if body.language.is_empty() {
        return Err(ApiError::Validation("language must not be empty".to_string()));
    }

    let template = state
        .engine
        .upsert_template(notification_type, &body.language, body.fields)
        .await?;
    Ok(Json(to_response(template)))
}

pub async fn rollback(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(template_id): Path<String>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let id = ObjectId::parse_str(&template_id)
        .map_err(|_| ApiError::BadRequest("Invalid template_id".to_string()))?;
    let template = state.engine.rollback_template(id).await?;
    Ok(Json(to_response(template)))
}

pub async fn delete(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(template_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = ObjectId::parse_str(&template_id)
        .map_err(|_| ApiError::BadRequest("Invalid template_id".to_string()))?;
    state.engine.delete_template(id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Dry-run rendering against a caller-supplied context, for template
/// authoring tools.
pub async fn render(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(body): Json<RenderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let notification_type = parse_type(&body.notification_type)?;
    let language = body
        .language
        .unwrap_or_else(|| state.settings.notify.default_language.clone());

    let rendered = state
        .engine
        .render(notification_type, &language, &body.context)
        .await;

    Ok(Json(serde_json::json!({
        "subject": rendered.subject,
        "html_body": rendered.html_body,
        "text_body": rendered.text_body,
        "push_title": rendered.push_title,
        "push_body": rendered.push_body,
        "sms": rendered.sms,
        "in_app": rendered.in_app,
    })))
}
