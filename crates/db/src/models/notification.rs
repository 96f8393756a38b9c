use bson::{oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

/// One logical event addressed to one user, fanned out across the channels
/// selected at send time. Delivery entries exist only for selected channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub notification_type: NotificationType,
    /// Free-form key/value context the templates were rendered against.
    #[serde(default)]
    pub payload: Document,
    #[serde(default)]
    pub deliveries: Vec<ChannelDelivery>,
    #[serde(default)]
    pub is_read: bool,
    pub read_at: Option<DateTime>,
    /// Reason of the most recent failing attempt, any channel.
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime,
}

impl Notification {
    pub const COLLECTION: &'static str = "notifications";

    pub fn delivery(&self, channel: Channel) -> Option<&ChannelDelivery> {
        self.deliveries.iter().find(|d| d.channel == channel)
    }
}

/// Per-channel delivery bookkeeping, one entry per selected channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDelivery {
    pub channel: Channel,
    #[serde(default)]
    pub status: DeliveryStatus,
    pub delivered_at: Option<DateTime>,
}

impl ChannelDelivery {
    pub fn pending(channel: Channel) -> Self {
        Self {
            channel,
            status: DeliveryStatus::Pending,
            delivered_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
    Push,
    Sms,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::InApp, Channel::Email, Channel::Push, Channel::Sms];

    /// BSON field value, matches the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InApp => "in_app",
            Channel::Email => "email",
            Channel::Push => "push",
            Channel::Sms => "sms",
        }
    }

    pub fn parse(s: &str) -> Option<Channel> {
        match s {
            "in_app" => Some(Channel::InApp),
            "email" => Some(Channel::Email),
            "push" => Some(Channel::Push),
            "sms" => Some(Channel::Sms),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewApplication,
    ApplicationStatus,
    NewReview,
    NewMessage,
    JobAlert,
    InterviewReminder,
    SecurityAlert,
    ComplianceUpdate,
}

impl NotificationType {
    pub const ALL: [NotificationType; 8] = [
        NotificationType::NewApplication,
        NotificationType::ApplicationStatus,
        NotificationType::NewReview,
        NotificationType::NewMessage,
        NotificationType::JobAlert,
        NotificationType::InterviewReminder,
        NotificationType::SecurityAlert,
        NotificationType::ComplianceUpdate,
    ];

    /// BSON field value, matches the serde representation. Also the key used
    /// in preference `type_preferences` maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewApplication => "new_application",
            NotificationType::ApplicationStatus => "application_status",
            NotificationType::NewReview => "new_review",
            NotificationType::NewMessage => "new_message",
            NotificationType::JobAlert => "job_alert",
            NotificationType::InterviewReminder => "interview_reminder",
            NotificationType::SecurityAlert => "security_alert",
            NotificationType::ComplianceUpdate => "compliance_update",
        }
    }

    pub fn parse(s: &str) -> Option<NotificationType> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Security-related types may use SMS without an explicit opt-in.
    pub fn is_security(&self) -> bool {
        matches!(self, NotificationType::SecurityAlert)
    }
}
