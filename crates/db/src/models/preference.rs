use std::collections::HashMap;

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::notification::Channel;

/// Per-user notification settings. Exactly one document per user (unique
/// index on `user_id`), created lazily with defaults on first access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    #[serde(default = "default_true")]
    pub in_app_enabled: bool,
    #[serde(default = "default_true")]
    pub email_enabled: bool,
    #[serde(default = "default_true")]
    pub push_enabled: bool,
    #[serde(default)]
    pub sms_enabled: bool,
    #[serde(default)]
    pub quiet_hours: QuietHours,
    #[serde(default)]
    pub email_digest: DigestFrequency,
    /// Per-type channel overrides keyed by `NotificationType::as_str()`.
    /// An absent entry or an absent channel field means the channel-level
    /// toggle applies.
    #[serde(default)]
    pub type_preferences: HashMap<String, TypeChannelOverrides>,
    /// Opaque tokens for one-click unsubscribe links (unique indexes).
    pub email_unsubscribe_token: String,
    pub sms_unsubscribe_token: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl NotificationPreference {
    pub const COLLECTION: &'static str = "notification_preferences";

    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::InApp => self.in_app_enabled,
            Channel::Email => self.email_enabled,
            Channel::Push => self.push_enabled,
            Channel::Sms => self.sms_enabled,
        }
    }

    /// Type-specific override for a channel, if one is set.
    pub fn type_override(&self, type_key: &str, channel: Channel) -> Option<bool> {
        self.type_preferences.get(type_key).and_then(|o| match channel {
            Channel::InApp => o.in_app,
            Channel::Email => o.email,
            Channel::Push => o.push,
            Channel::Sms => o.sms,
        })
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeChannelOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_app: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms: Option<bool>,
}

/// A daily window during which non-urgent delivery is suppressed.
/// `start > end` wraps past midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHours {
    #[serde(default)]
    pub enabled: bool,
    /// "HH:MM", local to `timezone`.
    pub start: String,
    pub end: String,
    /// IANA timezone name, e.g. "Europe/Berlin".
    pub timezone: String,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DigestFrequency {
    #[default]
    Immediate,
    Daily,
    Weekly,
    Never,
}
