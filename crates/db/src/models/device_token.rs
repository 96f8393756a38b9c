use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// A mobile push endpoint. Unique per (user_id, token); re-registration
/// reactivates instead of duplicating. Tokens the provider reports as
/// unregistered are deactivated, and hard-deleted only by the scheduled
/// cleanup of long-inactive tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub platform: Platform,
    pub token: String,
    pub device_model: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub last_used_at: DateTime,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl DeviceToken {
    pub const COLLECTION: &'static str = "device_tokens";
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}
