use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use serde::Serialize;
use worklink_db::models::{DeviceToken, Platform};

use super::base::{BaseDao, DaoError, DaoResult};

#[derive(Debug, Clone, Default)]
pub struct TokenMetadata {
    pub device_model: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenStats {
    pub total: u64,
    pub active: u64,
    pub ios: u64,
    pub android: u64,
}

pub struct DeviceTokenDao {
    pub base: BaseDao<DeviceToken>,
}

impl DeviceTokenDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, DeviceToken::COLLECTION),
        }
    }

    /// Registers a push endpoint. Re-registering an existing (user, token)
    /// pair reactivates it and refreshes the metadata; the unique index
    /// guarantees no duplicate is ever created.
    pub async fn register(
        &self,
        user_id: ObjectId,
        platform: Platform,
        token: &str,
        metadata: TokenMetadata,
    ) -> DaoResult<DeviceToken> {
        let now = DateTime::now();

        let existing = self
            .base
            .find_one(doc! { "user_id": user_id, "token": token })
            .await?;

        if let Some(existing) = existing {
            let id = existing.id.ok_or(DaoError::NotFound)?;
            self.base
                .update_by_id(
                    id,
                    doc! { "$set": {
                        "platform": platform.as_str(),
                        "device_model": metadata.device_model.clone(),
                        "os_version": metadata.os_version.clone(),
                        "app_version": metadata.app_version.clone(),
                        "is_active": true,
                        "last_used_at": now,
                        "updated_at": now,
                    } },
                )
                .await?;
            return self.base.find_by_id(id).await;
        }

        let device_token = DeviceToken {
            id: None,
            user_id,
            platform,
            token: token.to_string(),
            device_model: metadata.device_model,
            os_version: metadata.os_version,
            app_version: metadata.app_version,
            is_active: true,
            last_used_at: now,
            created_at: now,
            updated_at: now,
        };
        match self.base.insert_one(&device_token).await {
            Ok(id) => self.base.find_by_id(id).await,
            // Concurrent registration of the same token: reactivate the
            // winner's row instead.
            Err(e) if e.is_duplicate_key() => {
                self.base
                    .update_one(
                        doc! { "user_id": user_id, "token": token },
                        doc! { "$set": { "is_active": true, "last_used_at": now, "updated_at": now } },
                    )
                    .await?;
                self.base
                    .find_one(doc! { "user_id": user_id, "token": token })
                    .await?
                    .ok_or(DaoError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find_active(&self, user_id: ObjectId) -> DaoResult<Vec<DeviceToken>> {
        self.base
            .find_many(
                doc! { "user_id": user_id, "is_active": true },
                Some(doc! { "last_used_at": -1 }),
            )
            .await
    }

    pub async fn deactivate(&self, id: ObjectId, user_id: ObjectId) -> DaoResult<()> {
        let updated = self
            .base
            .update_one(
                doc! { "_id": id, "user_id": user_id },
                doc! { "$set": { "is_active": false, "updated_at": DateTime::now() } },
            )
            .await?;
        if !updated {
            // Either unknown id or already inactive; verify existence.
            self.base.find_by_id_for_user(id, user_id).await?;
        }
        Ok(())
    }

    pub async fn deactivate_all(&self, user_id: ObjectId) -> DaoResult<u64> {
        self.base
            .update_many(
                doc! { "user_id": user_id, "is_active": true },
                doc! { "$set": { "is_active": false, "updated_at": DateTime::now() } },
            )
            .await
    }

    /// Soft-deactivation for tokens the provider reported as permanently
    /// unregistered. Keyed by token value since providers echo the token,
    /// not our id.
    pub async fn deactivate_by_token(&self, token: &str) -> DaoResult<u64> {
        self.base
            .update_many(
                doc! { "token": token, "is_active": true },
                doc! { "$set": { "is_active": false, "updated_at": DateTime::now() } },
            )
            .await
    }

    pub async fn stats(&self, user_id: ObjectId) -> DaoResult<TokenStats> {
        Ok(TokenStats {
            total: self.base.count(doc! { "user_id": user_id }).await?,
            active: self
                .base
                .count(doc! { "user_id": user_id, "is_active": true })
                .await?,
            ios: self
                .base
                .count(doc! { "user_id": user_id, "platform": "ios", "is_active": true })
                .await?,
            android: self
                .base
                .count(doc! { "user_id": user_id, "platform": "android", "is_active": true })
                .await?,
        })
    }

    /// Hard-deletes tokens that have been inactive past the retention window.
    /// Only the scheduled cleanup calls this.
    pub async fn purge_inactive(&self, inactive_since: DateTime) -> DaoResult<u64> {
        self.base
            .hard_delete(doc! {
                "is_active": false,
                "last_used_at": { "$lt": inactive_since },
            })
            .await
    }
}
