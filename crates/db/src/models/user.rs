use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Read-only view of the user document owned by the surrounding CRUD layer.
/// The notification engine only needs a delivery address and locale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub display_name: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    pub phone_number: Option<String>,
    pub created_at: DateTime,
}

impl User {
    pub const COLLECTION: &'static str = "users";
}

fn default_locale() -> String {
    "en".to_string()
}
