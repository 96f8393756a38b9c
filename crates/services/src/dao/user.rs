use bson::{doc, oid::ObjectId};
use mongodb::Database;
use worklink_db::models::User;

use super::base::{BaseDao, DaoResult};

/// Read-only access to the user collection owned by the surrounding CRUD
/// layer; the engine needs delivery addresses and locales, nothing more.
pub struct UserDao {
    pub base: BaseDao<User>,
}

impl UserDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, User::COLLECTION),
        }
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<User> {
        self.base.find_by_id(id).await
    }
}
