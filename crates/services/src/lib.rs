pub mod auth;
pub mod background;
pub mod dao;
pub mod notify;

pub use auth::AuthService;
pub use dao::*;
pub use notify::NotifyService;
