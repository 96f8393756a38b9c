use std::collections::HashMap;

use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use nanoid::nanoid;
use serde::Deserialize;
use worklink_db::models::{
    Channel, DigestFrequency, NotificationPreference, QuietHours, TypeChannelOverrides,
};

use super::base::{BaseDao, DaoError, DaoResult};

/// Fields a caller may change; everything absent is left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferenceUpdate {
    pub in_app_enabled: Option<bool>,
    pub email_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub quiet_hours: Option<QuietHours>,
    pub email_digest: Option<DigestFrequency>,
    pub type_preferences: Option<HashMap<String, TypeChannelOverrides>>,
}

pub struct PreferenceDao {
    pub base: BaseDao<NotificationPreference>,
}

impl PreferenceDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, NotificationPreference::COLLECTION),
        }
    }

    /// Returns the user's preferences, creating the documented defaults on
    /// first access. Concurrent first calls race on the unique `user_id`
    /// index; the loser re-reads the winner's document.
    pub async fn get_or_create(&self, user_id: ObjectId) -> DaoResult<NotificationPreference> {
        if let Some(prefs) = self.base.find_one(doc! { "user_id": user_id }).await? {
            return Ok(prefs);
        }

        let defaults = Self::defaults(user_id);
        match self.base.insert_one(&defaults).await {
            Ok(id) => self.base.find_by_id(id).await,
            Err(e) if e.is_duplicate_key() => self
                .base
                .find_one(doc! { "user_id": user_id })
                .await?
                .ok_or(DaoError::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Documented defaults: in-app/email/push on, SMS off.
    pub fn defaults(user_id: ObjectId) -> NotificationPreference {
        let now = DateTime::now();
        NotificationPreference {
            id: None,
            user_id,
            in_app_enabled: true,
            email_enabled: true,
            push_enabled: true,
            sms_enabled: false,
            quiet_hours: QuietHours::default(),
            email_digest: DigestFrequency::Immediate,
            type_preferences: HashMap::new(),
            email_unsubscribe_token: nanoid!(32),
            sms_unsubscribe_token: nanoid!(32),
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn update(
        &self,
        user_id: ObjectId,
        update: PreferenceUpdate,
    ) -> DaoResult<NotificationPreference> {
        // Ensure the document exists before merging the partial update.
        self.get_or_create(user_id).await?;

        let mut set = doc! { "updated_at": DateTime::now() };
        if let Some(v) = update.in_app_enabled {
            set.insert("in_app_enabled", v);
        }
        if let Some(v) = update.email_enabled {
            set.insert("email_enabled", v);
        }
        if let Some(v) = update.push_enabled {
            set.insert("push_enabled", v);
        }
        if let Some(v) = update.sms_enabled {
            set.insert("sms_enabled", v);
        }
        if let Some(v) = update.quiet_hours {
            set.insert("quiet_hours", bson::to_bson(&v)?);
        }
        if let Some(v) = update.email_digest {
            set.insert("email_digest", bson::to_bson(&v)?);
        }
        if let Some(v) = update.type_preferences {
            set.insert("type_preferences", bson::to_bson(&v)?);
        }

        self.base
            .update_one(doc! { "user_id": user_id }, doc! { "$set": set })
            .await?;
        self.base
            .find_one(doc! { "user_id": user_id })
            .await?
            .ok_or(DaoError::NotFound)
    }

    /// Restores the documented defaults but keeps the unsubscribe tokens, so
    /// already-sent emails keep working links.
    pub async fn reset_to_defaults(&self, user_id: ObjectId) -> DaoResult<NotificationPreference> {
        self.get_or_create(user_id).await?;
        self.base
            .update_one(
                doc! { "user_id": user_id },
                doc! { "$set": {
                    "in_app_enabled": true,
                    "email_enabled": true,
                    "push_enabled": true,
                    "sms_enabled": false,
                    "quiet_hours": bson::to_bson(&QuietHours::default())?,
                    "email_digest": bson::to_bson(&DigestFrequency::Immediate)?,
                    "type_preferences": {},
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;
        self.base
            .find_one(doc! { "user_id": user_id })
            .await?
            .ok_or(DaoError::NotFound)
    }

    /// One-click unsubscribe. The token identifies both the user and the
    /// channel it was issued for; an unknown token is NotFound, never a
    /// silent no-op.
    pub async fn unsubscribe(
        &self,
        token: &str,
        channel: Channel,
    ) -> DaoResult<NotificationPreference> {
        let (token_field, toggle_field) = match channel {
            Channel::Email => ("email_unsubscribe_token", "email_enabled"),
            Channel::Sms => ("sms_unsubscribe_token", "sms_enabled"),
            _ => {
                return Err(DaoError::Validation(format!(
                    "Channel {} has no unsubscribe tokens",
                    channel.as_str()
                )));
            }
        };

        let prefs = self
            .base
            .find_one(doc! { token_field: token })
            .await?
            .ok_or(DaoError::NotFound)?;

        self.base
            .update_one(
                doc! { "user_id": prefs.user_id },
                doc! { "$set": { toggle_field: false, "updated_at": DateTime::now() } },
            )
            .await?;
        self.base
            .find_one(doc! { "user_id": prefs.user_id })
            .await?
            .ok_or(DaoError::NotFound)
    }
}
