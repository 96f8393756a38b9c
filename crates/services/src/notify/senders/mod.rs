pub mod email;
pub mod in_app;
pub mod push;
pub mod sms;

pub use email::EmailSender;
pub use in_app::InAppSender;
pub use push::{HttpPushProvider, PushProvider, PushSender};
pub use sms::SmsSender;

/// Outcome of delivering one rendered payload to one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Sent {
        provider_message_id: Option<String>,
    },
    /// The provider reported the endpoint as permanently unreachable. The
    /// caller deactivates it; retrying is pointless.
    InvalidTarget {
        code: String,
    },
    /// Transient failure, subject to the queue's retry policy.
    Failed {
        error: String,
    },
    /// Nothing to deliver to right now (no live session). The record stays
    /// Pending for later read; not an error, not retried.
    Deferred,
}

/// Aggregate of a multi-endpoint send. Individual failures never fail the
/// batch; they are counted and, for permanently dead endpoints, listed.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub failure_count: usize,
    pub invalid_targets: Vec<String>,
    /// First transient error, kept for the failure_reason bookkeeping.
    pub first_error: Option<String>,
}

impl BatchOutcome {
    pub fn any_success(&self) -> bool {
        self.success_count > 0
    }
}
