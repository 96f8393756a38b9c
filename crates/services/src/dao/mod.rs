pub mod base;
pub mod device_token;
pub mod notification;
pub mod preference;
pub mod template;
pub mod user;

pub use base::BaseDao;
