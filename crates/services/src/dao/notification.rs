use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::Database;
use worklink_db::models::{
    Channel, ChannelDelivery, DeliveryStatus, Notification, NotificationType,
};

use super::base::{BaseDao, DaoResult, PaginatedResult, PaginationParams};

pub struct NotificationDao {
    pub base: BaseDao<Notification>,
}

impl NotificationDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Notification::COLLECTION),
        }
    }

    /// Creates the record with a Pending delivery entry per selected channel.
    /// Unselected channels get no entry at all.
    pub async fn create(
        &self,
        user_id: ObjectId,
        notification_type: NotificationType,
        payload: Document,
        channels: &[Channel],
    ) -> DaoResult<Notification> {
        let notification = Notification {
            id: None,
            user_id,
            notification_type,
            payload,
            deliveries: channels.iter().map(|c| ChannelDelivery::pending(*c)).collect(),
            is_read: false,
            read_at: None,
            failure_reason: None,
            retry_count: 0,
            created_at: DateTime::now(),
        };
        let id = self.base.insert_one(&notification).await?;
        self.base.find_by_id(id).await
    }

    pub async fn find_for_user(
        &self,
        user_id: ObjectId,
        type_filter: Option<NotificationType>,
        is_read_filter: Option<bool>,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<Notification>> {
        let mut filter = doc! { "user_id": user_id };
        if let Some(t) = type_filter {
            filter.insert("notification_type", t.as_str());
        }
        if let Some(is_read) = is_read_filter {
            filter.insert("is_read", is_read);
        }
        self.base
            .find_paginated(filter, Some(doc! { "created_at": -1 }), params)
            .await
    }

    /// Transitions one channel's delivery entry. The positional operator
    /// targets the entry matching `channel`; a notification that never
    /// selected the channel is left untouched.
    pub async fn set_delivery_status(
        &self,
        id: ObjectId,
        channel: Channel,
        status: DeliveryStatus,
    ) -> DaoResult<bool> {
        let mut set = doc! { "deliveries.$.status": bson::to_bson(&status)? };
        if status == DeliveryStatus::Sent {
            set.insert("deliveries.$.delivered_at", DateTime::now());
        }
        self.base
            .update_one(
                doc! { "_id": id, "deliveries.channel": channel.as_str() },
                doc! { "$set": set },
            )
            .await
    }

    /// Records a failed attempt: bumps the shared retry counter and keeps the
    /// most recent failure reason. Does not touch the channel status; that
    /// only goes Failed once the queue gives up.
    pub async fn record_attempt_failure(
        &self,
        id: ObjectId,
        reason: &str,
    ) -> DaoResult<bool> {
        self.base
            .update_by_id(
                id,
                doc! {
                    "$set": { "failure_reason": reason },
                    "$inc": { "retry_count": 1 },
                },
            )
            .await
    }

    /// Idempotent: marking an already-read notification modifies nothing and
    /// is reported as success. Unknown or foreign ids are NotFound.
    pub async fn mark_read(&self, id: ObjectId, user_id: ObjectId) -> DaoResult<()> {
        // Ownership check first so a no-op update is distinguishable from a
        // missing record.
        self.base.find_by_id_for_user(id, user_id).await?;
        self.base
            .update_one(
                doc! { "_id": id, "user_id": user_id, "is_read": false },
                doc! { "$set": { "is_read": true, "read_at": DateTime::now() } },
            )
            .await?;
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: ObjectId) -> DaoResult<u64> {
        self.base
            .update_many(
                doc! { "user_id": user_id, "is_read": false },
                doc! { "$set": { "is_read": true, "read_at": DateTime::now() } },
            )
            .await
    }

    pub async fn unread_count(&self, user_id: ObjectId) -> DaoResult<u64> {
        self.base
            .count(doc! { "user_id": user_id, "is_read": false })
            .await
    }

    /// Hard delete, scoped to the owner.
    pub async fn delete(&self, id: ObjectId, user_id: ObjectId) -> DaoResult<()> {
        let deleted = self
            .base
            .hard_delete(doc! { "_id": id, "user_id": user_id })
            .await?;
        if deleted == 0 {
            return Err(super::base::DaoError::NotFound);
        }
        Ok(())
    }
}
