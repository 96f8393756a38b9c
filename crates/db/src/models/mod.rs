pub mod device_token;
pub mod notification;
pub mod preference;
pub mod template;
pub mod user;

pub use device_token::*;
pub use notification::*;
pub use preference::*;
pub use template::*;
pub use user::*;
