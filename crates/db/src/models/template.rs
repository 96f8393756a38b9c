use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::notification::NotificationType;

/// An immutable, numbered rendering of a notification type/language.
/// At most one version >= 1 is active per (type, language); version 0 is the
/// seeded fallback, never active and never deletable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub notification_type: NotificationType,
    /// Locale code, e.g. "en".
    pub language: String,
    pub version: u32,
    #[serde(default)]
    pub is_active: bool,
    // Per-channel bodies. Each is an interpolation template over the
    // notification payload; any may be absent.
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub push_title: Option<String>,
    pub push_body: Option<String>,
    pub sms_template: Option<String>,
    pub in_app_template: Option<String>,
    /// Declared variables, for documentation and admin tooling.
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl NotificationTemplate {
    pub const COLLECTION: &'static str = "notification_templates";

    /// The seeded fallback row.
    pub const FALLBACK_VERSION: u32 = 0;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
