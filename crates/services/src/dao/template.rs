use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use serde::Deserialize;
use worklink_db::models::{NotificationTemplate, NotificationType, TemplateVariable};

use super::base::{BaseDao, DaoResult, PaginatedResult, PaginationParams};

/// Channel bodies of a template, as accepted from the admin API. Versioning
/// fields are managed by the engine, never by callers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateFields {
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub push_title: Option<String>,
    pub push_body: Option<String>,
    pub sms_template: Option<String>,
    pub in_app_template: Option<String>,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateFilter {
    pub notification_type: Option<NotificationType>,
    pub language: Option<String>,
    pub active_only: Option<bool>,
}

pub struct TemplateDao {
    pub base: BaseDao<NotificationTemplate>,
}

impl TemplateDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, NotificationTemplate::COLLECTION),
        }
    }

    pub async fn find_active(
        &self,
        notification_type: NotificationType,
        language: &str,
    ) -> DaoResult<Option<NotificationTemplate>> {
        self.base
            .find_one(doc! {
                "notification_type": notification_type.as_str(),
                "language": language,
                "is_active": true,
            })
            .await
    }

    pub async fn find_version(
        &self,
        notification_type: NotificationType,
        language: &str,
        version: u32,
    ) -> DaoResult<Option<NotificationTemplate>> {
        self.base
            .find_one(doc! {
                "notification_type": notification_type.as_str(),
                "language": language,
                "version": version,
            })
            .await
    }

    pub async fn insert(
        &self,
        notification_type: NotificationType,
        language: &str,
        version: u32,
        is_active: bool,
        fields: TemplateFields,
    ) -> DaoResult<NotificationTemplate> {
        let now = DateTime::now();
        let template = NotificationTemplate {
            id: None,
            notification_type,
            language: language.to_string(),
            version,
            is_active,
            subject: fields.subject,
            html_body: fields.html_body,
            text_body: fields.text_body,
            push_title: fields.push_title,
            push_body: fields.push_body,
            sms_template: fields.sms_template,
            in_app_template: fields.in_app_template,
            variables: fields.variables,
            created_at: now,
            updated_at: now,
        };
        let id = self.base.insert_one(&template).await?;
        self.base.find_by_id(id).await
    }

    pub async fn set_active(&self, id: ObjectId, is_active: bool) -> DaoResult<bool> {
        self.base
            .update_by_id(
                id,
                doc! { "$set": { "is_active": is_active, "updated_at": DateTime::now() } },
            )
            .await
    }

    pub async fn list(
        &self,
        filter: &TemplateFilter,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<NotificationTemplate>> {
        let mut query = doc! {};
        if let Some(t) = filter.notification_type {
            query.insert("notification_type", t.as_str());
        }
        if let Some(ref lang) = filter.language {
            query.insert("language", lang);
        }
        if filter.active_only == Some(true) {
            query.insert("is_active", true);
        }
        self.base
            .find_paginated(
                query,
                Some(doc! { "notification_type": 1, "language": 1, "version": -1 }),
                params,
            )
            .await
    }

    pub async fn find_by_type(
        &self,
        notification_type: NotificationType,
    ) -> DaoResult<Vec<NotificationTemplate>> {
        self.base
            .find_many(
                doc! { "notification_type": notification_type.as_str() },
                Some(doc! { "language": 1, "version": -1 }),
            )
            .await
    }

    pub async fn delete_by_id(&self, id: ObjectId) -> DaoResult<u64> {
        self.base.hard_delete(doc! { "_id": id }).await
    }
}
