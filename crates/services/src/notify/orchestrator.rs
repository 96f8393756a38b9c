use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::{oid::ObjectId, Document};
use chrono::Utc;
use mongodb::Database;
use serde::Serialize;
use tracing::{debug, info, warn};
use worklink_config::Settings;
use worklink_db::models::{Channel, DeliveryStatus, Notification, NotificationType};

use crate::dao::base::{DaoError, PaginatedResult, PaginationParams};
use crate::dao::device_token::DeviceTokenDao;
use crate::dao::notification::NotificationDao;
use crate::dao::preference::PreferenceDao;
use crate::dao::user::UserDao;

use super::engine::{RenderedContent, TemplateEngine};
use super::error::{NotifyError, NotifyResult};
use super::fanout::LiveEvents;
use super::policy::{apply_quiet_hours, resolve_channels};
use super::queue::{DeliveryQueue, JobHandler, JobResult, RetryPolicy};
use super::senders::{
    BatchOutcome, EmailSender, HttpPushProvider, InAppSender, PushSender, SendOutcome, SmsSender,
};

/// One channel's delivery work for one notification, carried through the
/// queue with the content already rendered.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub notification_id: ObjectId,
    pub user_id: ObjectId,
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub content: RenderedContent,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelDispatch {
    pub channel: Channel,
    pub success: bool,
    pub error: Option<String>,
}

/// What `send` reports back: which channels were accepted for delivery. The
/// actual delivery outcome lands asynchronously on the stored record.
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    #[serde(serialize_with = "bson::serde_helpers::serialize_object_id_as_hex_string")]
    pub notification_id: ObjectId,
    pub channels: Vec<ChannelDispatch>,
    pub any_success: bool,
    pub all_failed: bool,
}

/// A zero-channel send succeeded at nothing; report it as fully failed
/// rather than vacuously successful.
fn aggregate(channels: &[ChannelDispatch]) -> (bool, bool) {
    let any_success = channels.iter().any(|c| c.success);
    (any_success, !any_success)
}

/// Collapses a device fan-out into one channel outcome. Reaching any device
/// counts as delivered; every token unregistered means the channel has no
/// endpoints left and must not be retried.
fn push_outcome(batch: &BatchOutcome, token_count: usize) -> SendOutcome {
    if batch.any_success() {
        SendOutcome::Sent {
            provider_message_id: None,
        }
    } else if token_count > 0 && batch.invalid_targets.len() == token_count {
        SendOutcome::InvalidTarget {
            code: "all device tokens unregistered".to_string(),
        }
    } else {
        SendOutcome::Failed {
            error: batch
                .first_error
                .clone()
                .unwrap_or_else(|| "push delivery failed".to_string()),
        }
    }
}

/// Front door of the notification engine. Resolves the channel set from
/// preferences, persists the record, renders content in the recipient's
/// locale and hands per-channel jobs to the delivery queue.
pub struct NotifyService {
    worker: Arc<DeliveryWorker>,
    queue: DeliveryQueue<DeliveryJob>,
    templates: Arc<TemplateEngine>,
}

impl NotifyService {
    pub fn new(
        db: &Database,
        settings: &Settings,
        templates: Arc<TemplateEngine>,
        events: Arc<LiveEvents>,
    ) -> Arc<Self> {
        let push_provider = HttpPushProvider::from_settings(&settings.push)
            .map(|p| Box::new(p) as Box<dyn super::senders::PushProvider>);

        let worker = Arc::new(DeliveryWorker {
            notifications: NotificationDao::new(db),
            preferences: PreferenceDao::new(db),
            users: UserDao::new(db),
            device_tokens: DeviceTokenDao::new(db),
            email: EmailSender::new(&settings.smtp, settings.notify.unsubscribe_base_url.clone()),
            push: PushSender::new(push_provider),
            sms: SmsSender::new(&settings.sms),
            in_app: InAppSender::new(events),
            max_attempts: settings.notify.max_delivery_attempts,
        });

        let queue = DeliveryQueue::start(settings.notify.queue_workers, worker.clone());
        Arc::new(Self {
            worker,
            queue,
            templates,
        })
    }

    /// Sends one notification to one user. `channels` overrides preference
    /// resolution when given; otherwise the user's preferences, type
    /// overrides and quiet hours decide.
    pub async fn send(
        &self,
        user_id: ObjectId,
        notification_type: NotificationType,
        payload: Document,
        channels: Option<Vec<Channel>>,
    ) -> NotifyResult<SendResult> {
        let channels = match channels {
            Some(explicit) => explicit,
            None => {
                let prefs = self.worker.preferences.get_or_create(user_id).await?;
                let resolved = resolve_channels(&prefs, notification_type);
                apply_quiet_hours(resolved, &prefs, notification_type, Utc::now())
            }
        };

        let notification = self
            .worker
            .notifications
            .create(user_id, notification_type, payload, &channels)
            .await?;
        let notification_id = notification
            .id
            .ok_or_else(|| NotifyError::NotFound("notification id".into()))?;

        let content = self
            .render_for_user(user_id, notification_type, &notification.payload)
            .await;

        let mut dispatches = Vec::with_capacity(channels.len());
        for channel in &channels {
            let job = DeliveryJob {
                notification_id,
                user_id,
                notification_type,
                channel: *channel,
                content: content.clone(),
            };
            match self.queue.enqueue(job) {
                Ok(()) => dispatches.push(ChannelDispatch {
                    channel: *channel,
                    success: true,
                    error: None,
                }),
                Err(e) => dispatches.push(ChannelDispatch {
                    channel: *channel,
                    success: false,
                    error: Some(e),
                }),
            }
        }

        let (any_success, all_failed) = aggregate(&dispatches);
        info!(
            %user_id,
            notification_type = notification_type.as_str(),
            channels = dispatches.len(),
            all_failed,
            "Notification dispatched"
        );
        Ok(SendResult {
            notification_id,
            channels: dispatches,
            any_success,
            all_failed,
        })
    }

    async fn render_for_user(
        &self,
        user_id: ObjectId,
        notification_type: NotificationType,
        payload: &Document,
    ) -> RenderedContent {
        let language = match self.worker.users.find_by_id(user_id).await {
            Ok(user) => user.locale,
            Err(e) => {
                warn!(%user_id, %e, "Recipient lookup failed, rendering in default language");
                String::new()
            }
        };
        let context = serde_json::to_value(payload).unwrap_or_default();
        self.templates.render(notification_type, &language, &context).await
    }

    pub async fn list(
        &self,
        user_id: ObjectId,
        type_filter: Option<NotificationType>,
        is_read_filter: Option<bool>,
        params: &PaginationParams,
    ) -> NotifyResult<PaginatedResult<Notification>> {
        self.worker
            .notifications
            .find_for_user(user_id, type_filter, is_read_filter, params)
            .await
            .map_err(Into::into)
    }

    pub async fn get(&self, id: ObjectId, user_id: ObjectId) -> NotifyResult<Notification> {
        self.worker
            .notifications
            .base
            .find_by_id_for_user(id, user_id)
            .await
            .map_err(Into::into)
    }

    /// Marks one notification read and pushes the fresh unread count to the
    /// user's live sessions.
    pub async fn mark_read(&self, id: ObjectId, user_id: ObjectId) -> NotifyResult<u64> {
        self.worker.notifications.mark_read(id, user_id).await?;
        self.publish_unread(user_id).await
    }

    pub async fn mark_all_read(&self, user_id: ObjectId) -> NotifyResult<u64> {
        let modified = self.worker.notifications.mark_all_read(user_id).await?;
        debug!(%user_id, modified, "Marked all notifications read");
        self.publish_unread(user_id).await
    }

    pub async fn unread_count(&self, user_id: ObjectId) -> NotifyResult<u64> {
        self.worker
            .notifications
            .unread_count(user_id)
            .await
            .map_err(Into::into)
    }

    pub async fn delete(&self, id: ObjectId, user_id: ObjectId) -> NotifyResult<()> {
        self.worker.notifications.delete(id, user_id).await?;
        Ok(())
    }

    async fn publish_unread(&self, user_id: ObjectId) -> NotifyResult<u64> {
        let count = self.worker.notifications.unread_count(user_id).await?;
        self.worker.in_app.publish_unread_count(&user_id, count).await;
        Ok(count)
    }
}

/// Per-job delivery logic behind the queue.
struct DeliveryWorker {
    notifications: NotificationDao,
    preferences: PreferenceDao,
    users: UserDao,
    device_tokens: DeviceTokenDao,
    email: EmailSender,
    push: PushSender,
    sms: SmsSender,
    in_app: InAppSender,
    max_attempts: u32,
}

impl DeliveryWorker {
    async fn deliver(&self, job: &DeliveryJob) -> Result<SendOutcome, DaoError> {
        match job.channel {
            Channel::Email => self.deliver_email(job).await,
            Channel::Push => self.deliver_push(job).await,
            Channel::Sms => self.deliver_sms(job).await,
            Channel::InApp => self.deliver_in_app(job).await,
        }
    }

    async fn deliver_email(&self, job: &DeliveryJob) -> Result<SendOutcome, DaoError> {
        let user = self.users.find_by_id(job.user_id).await?;
        let prefs = self.preferences.get_or_create(job.user_id).await?;
        Ok(self
            .email
            .send(&user.email, &job.content, &prefs.email_unsubscribe_token)
            .await)
    }

    async fn deliver_push(&self, job: &DeliveryJob) -> Result<SendOutcome, DaoError> {
        let tokens = self.device_tokens.find_active(job.user_id).await?;
        if tokens.is_empty() {
            return Ok(SendOutcome::InvalidTarget {
                code: "no active device tokens".to_string(),
            });
        }

        let title = job
            .content
            .push_title
            .clone()
            .or_else(|| job.content.subject.clone())
            .unwrap_or_else(|| "Notification".to_string());
        let body = job
            .content
            .push_body
            .clone()
            .or_else(|| job.content.in_app.clone())
            .unwrap_or_default();
        let data = serde_json::json!({
            "notification_id": job.notification_id.to_hex(),
            "notification_type": job.notification_type.as_str(),
        });

        let batch = self.push.send_batch(&tokens, &title, &body, &data).await;
        for dead in &batch.invalid_targets {
            if let Err(e) = self.device_tokens.deactivate_by_token(dead).await {
                warn!(%e, "Failed to deactivate unregistered push token");
            }
        }

        Ok(push_outcome(&batch, tokens.len()))
    }

    async fn deliver_sms(&self, job: &DeliveryJob) -> Result<SendOutcome, DaoError> {
        let user = self.users.find_by_id(job.user_id).await?;
        let Some(phone) = user.phone_number else {
            return Ok(SendOutcome::InvalidTarget {
                code: "no phone number on file".to_string(),
            });
        };
        let body = job
            .content
            .sms
            .clone()
            .or_else(|| job.content.in_app.clone())
            .unwrap_or_else(|| "You have a new notification.".to_string());
        Ok(self.sms.send(&phone, &body).await)
    }

    async fn deliver_in_app(&self, job: &DeliveryJob) -> Result<SendOutcome, DaoError> {
        let notification = self.notifications.base.find_by_id(job.notification_id).await?;
        let unread = self.notifications.unread_count(job.user_id).await?;
        Ok(self
            .in_app
            .send(&notification, job.content.in_app.as_deref(), unread)
            .await)
    }
}

#[async_trait]
impl JobHandler<DeliveryJob> for DeliveryWorker {
    async fn handle(&self, job: &DeliveryJob, attempt: u32) -> JobResult {
        let outcome = match self.deliver(job).await {
            Ok(outcome) => outcome,
            Err(e) => SendOutcome::Failed {
                error: format!("storage error: {e}"),
            },
        };

        match outcome {
            SendOutcome::Sent { provider_message_id } => {
                debug!(
                    notification_id = %job.notification_id,
                    channel = job.channel.as_str(),
                    attempt,
                    ?provider_message_id,
                    "Delivery succeeded"
                );
                if let Err(e) = self
                    .notifications
                    .set_delivery_status(job.notification_id, job.channel, DeliveryStatus::Sent)
                    .await
                {
                    warn!(%e, "Delivered but failed to record status");
                }
                JobResult::Done
            }
            // Nothing listening right now; the stored record serves the next
            // list fetch, so this attempt is complete.
            SendOutcome::Deferred => JobResult::Done,
            SendOutcome::InvalidTarget { code } => {
                self.note_failure(job, &code).await;
                JobResult::Abort(code)
            }
            SendOutcome::Failed { error } => {
                self.note_failure(job, &error).await;
                JobResult::Retry(error)
            }
        }
    }

    async fn exhausted(&self, job: &DeliveryJob, reason: String) {
        warn!(
            notification_id = %job.notification_id,
            channel = job.channel.as_str(),
            %reason,
            "Delivery abandoned"
        );
        if let Err(e) = self
            .notifications
            .set_delivery_status(job.notification_id, job.channel, DeliveryStatus::Failed)
            .await
        {
            warn!(%e, "Failed to record abandoned delivery");
        }
    }

    fn retry_policy(&self, job: &DeliveryJob) -> RetryPolicy {
        match job.channel {
            // Live push is now-or-never; a session that just vanished will
            // read the stored record instead.
            Channel::InApp => RetryPolicy::new(1, Duration::from_millis(100)),
            Channel::Push => RetryPolicy::new(self.max_attempts, Duration::from_secs(5)),
            Channel::Email | Channel::Sms => {
                RetryPolicy::new(self.max_attempts, Duration::from_secs(30))
            }
        }
    }
}

impl DeliveryWorker {
    async fn note_failure(&self, job: &DeliveryJob, reason: &str) {
        if let Err(e) = self
            .notifications
            .record_attempt_failure(job.notification_id, reason)
            .await
        {
            warn!(%e, "Failed to record delivery failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch(channel: Channel, success: bool) -> ChannelDispatch {
        ChannelDispatch {
            channel,
            success,
            error: (!success).then(|| "queue closed".to_string()),
        }
    }

    #[test]
    fn empty_channel_set_is_all_failed() {
        let (any_success, all_failed) = aggregate(&[]);
        assert!(!any_success);
        assert!(all_failed);
    }

    #[test]
    fn one_success_clears_all_failed() {
        let (any_success, all_failed) = aggregate(&[
            dispatch(Channel::Email, false),
            dispatch(Channel::InApp, true),
        ]);
        assert!(any_success);
        assert!(!all_failed);
    }

    #[test]
    fn every_channel_failing_sets_all_failed() {
        let (any_success, all_failed) = aggregate(&[
            dispatch(Channel::Email, false),
            dispatch(Channel::Push, false),
        ]);
        assert!(!any_success);
        assert!(all_failed);
    }

    #[test]
    fn push_with_any_device_reached_is_sent() {
        let batch = BatchOutcome {
            success_count: 1,
            failure_count: 1,
            invalid_targets: vec!["dead".to_string()],
            first_error: None,
        };
        assert!(matches!(
            push_outcome(&batch, 2),
            SendOutcome::Sent { .. }
        ));
    }

    #[test]
    fn push_with_all_tokens_unregistered_aborts() {
        let batch = BatchOutcome {
            success_count: 0,
            failure_count: 2,
            invalid_targets: vec!["dead1".to_string(), "dead2".to_string()],
            first_error: None,
        };
        assert!(matches!(
            push_outcome(&batch, 2),
            SendOutcome::InvalidTarget { .. }
        ));
    }

    #[test]
    fn push_with_transient_failures_retries() {
        let batch = BatchOutcome {
            success_count: 0,
            failure_count: 2,
            invalid_targets: vec!["dead".to_string()],
            first_error: Some("gateway timeout".to_string()),
        };
        match push_outcome(&batch, 2) {
            SendOutcome::Failed { error } => assert_eq!(error, "gateway timeout"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
