pub mod engine;
pub mod error;
pub mod fanout;
pub mod interpolate;
pub mod orchestrator;
pub mod policy;
pub mod queue;
pub mod senders;
pub mod session;

pub use engine::TemplateEngine;
pub use error::{NotifyError, NotifyResult};
pub use orchestrator::NotifyService;
pub use session::SessionRegistry;
