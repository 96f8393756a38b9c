use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Notifications
    create_indexes(
        db,
        "notifications",
        vec![
            index(bson::doc! { "user_id": 1, "created_at": -1 }),
            index(bson::doc! { "user_id": 1, "is_read": 1 }),
            index(bson::doc! { "user_id": 1, "notification_type": 1, "created_at": -1 }),
        ],
    )
    .await?;

    // Preferences
    create_indexes(
        db,
        "notification_preferences",
        vec![
            index_unique(bson::doc! { "user_id": 1 }),
            index_unique(bson::doc! { "email_unsubscribe_token": 1 }),
            index_unique(bson::doc! { "sms_unsubscribe_token": 1 }),
        ],
    )
    .await?;

    // Templates
    create_indexes(
        db,
        "notification_templates",
        vec![
            index_unique(bson::doc! { "notification_type": 1, "language": 1, "version": 1 }),
            index(bson::doc! { "notification_type": 1, "language": 1, "is_active": 1 }),
        ],
    )
    .await?;

    // Device tokens
    create_indexes(
        db,
        "device_tokens",
        vec![
            index_unique(bson::doc! { "user_id": 1, "token": 1 }),
            index(bson::doc! { "user_id": 1, "is_active": 1 }),
            index(bson::doc! { "is_active": 1, "last_used_at": 1 }),
        ],
    )
    .await?;

    info!("MongoDB indexes ensured");
    Ok(())
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    db.collection::<bson::Document>(collection)
        .create_indexes(indexes)
        .await?;
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}
