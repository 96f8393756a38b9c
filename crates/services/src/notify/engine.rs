use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};
use worklink_db::models::{NotificationTemplate, NotificationType};

use crate::dao::template::{TemplateDao, TemplateFields};

use super::error::{NotifyError, NotifyResult};
use super::interpolate::interpolate;

/// Per-channel rendered strings; channels whose template body is absent stay
/// `None` and the sender for that channel degrades to its own minimum.
#[derive(Debug, Clone, Default)]
pub struct RenderedContent {
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub push_title: Option<String>,
    pub push_body: Option<String>,
    pub sms: Option<String>,
    pub in_app: Option<String>,
}

/// Versioned multi-channel template storage with an in-process cache.
///
/// The cache has no TTL; it is invalidated explicitly by upsert/rollback.
/// Reads vastly outnumber writes, and writes replace whole entries, so the
/// concurrent map needs no further locking.
pub struct TemplateEngine {
    dao: Arc<TemplateDao>,
    cache: DashMap<(NotificationType, String), Arc<NotificationTemplate>>,
    default_language: String,
}

impl TemplateEngine {
    pub fn new(dao: Arc<TemplateDao>, default_language: String) -> Self {
        Self {
            dao,
            cache: DashMap::new(),
            default_language,
        }
    }

    /// Renders every channel body of the resolved template against `context`.
    /// Never fails: storage errors and missing templates degrade through the
    /// seeded version-0 row down to built-in minimal content.
    pub async fn render(
        &self,
        notification_type: NotificationType,
        language: &str,
        context: &Value,
    ) -> RenderedContent {
        let template = self.resolve(notification_type, language).await;
        let fields = match template {
            Some(t) => template_fields(&t),
            None => fallback_fields(notification_type),
        };
        render_fields(&fields, context)
    }

    async fn resolve(
        &self,
        notification_type: NotificationType,
        language: &str,
    ) -> Option<Arc<NotificationTemplate>> {
        let key = (notification_type, language.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit.clone());
        }

        let resolved = self.lookup(notification_type, language).await;
        if let Some(ref t) = resolved {
            self.cache.insert(key, t.clone());
        }
        resolved
    }

    /// Miss chain: active row for the requested language, active row for the
    /// default language, then the seeded version-0 fallback.
    async fn lookup(
        &self,
        notification_type: NotificationType,
        language: &str,
    ) -> Option<Arc<NotificationTemplate>> {
        let attempts = [
            (language, false),
            (self.default_language.as_str(), false),
            (self.default_language.as_str(), true),
        ];
        for (lang, fallback_row) in attempts {
            let found = if fallback_row {
                self.dao
                    .find_version(notification_type, lang, NotificationTemplate::FALLBACK_VERSION)
                    .await
            } else {
                self.dao.find_active(notification_type, lang).await
            };
            match found {
                Ok(Some(t)) => return Some(Arc::new(t)),
                Ok(None) => continue,
                Err(e) => {
                    warn!(%e, notification_type = notification_type.as_str(), "Template lookup failed");
                    return None;
                }
            }
        }
        None
    }

    fn invalidate(&self, notification_type: NotificationType) {
        // Fallback resolution may have cached this type under any requested
        // language; drop them all.
        self.cache.retain(|(t, _), _| *t != notification_type);
    }

    /// Creates version 1, or deactivates the current active version and
    /// inserts its successor.
    pub async fn upsert_template(
        &self,
        notification_type: NotificationType,
        language: &str,
        fields: TemplateFields,
    ) -> NotifyResult<NotificationTemplate> {
        let active = self.dao.find_active(notification_type, language).await?;
        if let Some(ref active) = active {
            let id = active
                .id
                .ok_or_else(|| NotifyError::NotFound("template id".into()))?;
            self.dao.set_active(id, false).await?;
        }
        let next_version = next_version(active.as_ref().map(|a| a.version));

        let inserted = self
            .dao
            .insert(notification_type, language, next_version, true, fields)
            .await
            .map_err(|e| {
                if e.is_duplicate_key() {
                    NotifyError::Conflict(format!(
                        "Template {}/{} v{} already exists",
                        notification_type.as_str(),
                        language,
                        next_version
                    ))
                } else {
                    NotifyError::Dao(e)
                }
            })?;

        self.invalidate(notification_type);
        info!(
            notification_type = notification_type.as_str(),
            language,
            version = next_version,
            "Template version activated"
        );
        Ok(inserted)
    }

    /// Deactivates the current active version of the pair the given template
    /// belongs to and reactivates its predecessor. Version 1 has no
    /// predecessor; the seeded version 0 never participates in the chain.
    pub async fn rollback_template(
        &self,
        template_id: bson::oid::ObjectId,
    ) -> NotifyResult<NotificationTemplate> {
        let reference = self.dao.base.find_by_id(template_id).await?;
        let active = self
            .dao
            .find_active(reference.notification_type, &reference.language)
            .await?
            .ok_or_else(|| {
                NotifyError::NotFound(format!(
                    "No active template for {}/{}",
                    reference.notification_type.as_str(),
                    reference.language
                ))
            })?;

        let target = rollback_target(active.version)?;
        let prior = self
            .dao
            .find_version(reference.notification_type, &reference.language, target)
            .await?
            .ok_or_else(|| NotifyError::Usage(format!("Version {target} no longer exists")))?;

        let active_id = active
            .id
            .ok_or_else(|| NotifyError::NotFound("template id".into()))?;
        let prior_id = prior
            .id
            .ok_or_else(|| NotifyError::NotFound("template id".into()))?;

        self.dao.set_active(active_id, false).await?;
        self.dao.set_active(prior_id, true).await?;
        self.invalidate(reference.notification_type);
        info!(
            notification_type = reference.notification_type.as_str(),
            language = %reference.language,
            from = active.version,
            to = prior.version,
            "Template rolled back"
        );
        self.dao.base.find_by_id(prior_id).await.map_err(Into::into)
    }

    /// Hard-deletes a template version. The seeded fallback and the currently
    /// active version are protected.
    pub async fn delete_template(&self, template_id: bson::oid::ObjectId) -> NotifyResult<()> {
        let template = self.dao.base.find_by_id(template_id).await?;
        if template.version == NotificationTemplate::FALLBACK_VERSION {
            return Err(NotifyError::Usage(
                "The seeded fallback template cannot be deleted".to_string(),
            ));
        }
        if template.is_active {
            return Err(NotifyError::Usage(
                "Cannot delete the active version; roll back or supersede it first".to_string(),
            ));
        }
        self.dao.delete_by_id(template_id).await?;
        self.invalidate(template.notification_type);
        Ok(())
    }

    /// Seeds the version-0 fallback row per notification type. Idempotent;
    /// runs at startup.
    pub async fn ensure_fallbacks(&self) -> NotifyResult<()> {
        for notification_type in NotificationType::ALL {
            let existing = self
                .dao
                .find_version(
                    notification_type,
                    &self.default_language,
                    NotificationTemplate::FALLBACK_VERSION,
                )
                .await?;
            if existing.is_some() {
                continue;
            }
            match self
                .dao
                .insert(
                    notification_type,
                    &self.default_language,
                    NotificationTemplate::FALLBACK_VERSION,
                    false,
                    fallback_fields(notification_type),
                )
                .await
            {
                Ok(_) => {
                    debug!(
                        notification_type = notification_type.as_str(),
                        "Seeded fallback template"
                    );
                }
                // Another instance seeded concurrently.
                Err(e) if e.is_duplicate_key() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Version an upsert assigns given the currently active version: always its
/// direct successor, or 1 when the (type, language) chain is empty.
fn next_version(active: Option<u32>) -> u32 {
    active.map(|v| v + 1).unwrap_or(1)
}

/// Version a rollback reactivates. Version 1 has no predecessor, and the
/// seeded version 0 is outside the chain entirely.
fn rollback_target(active_version: u32) -> NotifyResult<u32> {
    if active_version <= 1 {
        return Err(NotifyError::Usage(
            "Cannot roll back version 1; no prior version exists".to_string(),
        ));
    }
    Ok(active_version - 1)
}

fn template_fields(t: &NotificationTemplate) -> TemplateFields {
    TemplateFields {
        subject: t.subject.clone(),
        html_body: t.html_body.clone(),
        text_body: t.text_body.clone(),
        push_title: t.push_title.clone(),
        push_body: t.push_body.clone(),
        sms_template: t.sms_template.clone(),
        in_app_template: t.in_app_template.clone(),
        variables: t.variables.clone(),
    }
}

fn render_fields(fields: &TemplateFields, context: &Value) -> RenderedContent {
    let render = |body: &Option<String>| -> Option<String> {
        body.as_deref()
            .filter(|b| !b.is_empty())
            .map(|b| interpolate(b, context))
    };
    RenderedContent {
        subject: render(&fields.subject),
        html_body: render(&fields.html_body),
        text_body: render(&fields.text_body),
        push_title: render(&fields.push_title),
        push_body: render(&fields.push_body),
        sms: render(&fields.sms_template),
        in_app: render(&fields.in_app_template),
    }
}

/// Built-in minimal content, used to seed the version-0 rows and as the last
/// resort when even those are unreachable.
pub fn fallback_fields(notification_type: NotificationType) -> TemplateFields {
    let (subject, body): (&str, &str) = match notification_type {
        NotificationType::NewApplication => (
            "New application for {{default job_title \"your posting\"}}",
            "{{default applicant_name \"Someone\"}} applied to {{default job_title \"your posting\"}}.",
        ),
        NotificationType::ApplicationStatus => (
            "Your application was updated",
            "Your application for {{default job_title \"a position\"}} is now {{default status \"updated\"}}.",
        ),
        NotificationType::NewReview => (
            "You received a new review",
            "{{default reviewer_name \"Someone\"}} left you a review.",
        ),
        NotificationType::NewMessage => (
            "New message from {{default sender_name \"a contact\"}}",
            "{{default sender_name \"Someone\"}} sent you a message.",
        ),
        NotificationType::JobAlert => (
            "New jobs matching your profile",
            "{{default match_count \"New\"}} jobs match your saved search.",
        ),
        NotificationType::InterviewReminder => (
            "Interview reminder",
            "Your interview for {{default job_title \"a position\"}} is coming up.",
        ),
        NotificationType::SecurityAlert => (
            "Security alert on your account",
            "{{default alert_reason \"Unusual activity was detected on your account.\"}}",
        ),
        NotificationType::ComplianceUpdate => (
            "Action required on your account",
            "{{default update_reason \"A compliance update requires your attention.\"}}",
        ),
    };

    TemplateFields {
        subject: Some(subject.to_string()),
        html_body: Some(format!("<p>{}</p>", body)),
        text_body: Some(body.to_string()),
        push_title: Some(subject.to_string()),
        push_body: Some(body.to_string()),
        sms_template: Some(body.to_string()),
        in_app_template: Some(body.to_string()),
        variables: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_assigns_consecutive_versions() {
        assert_eq!(next_version(None), 1);
        assert_eq!(next_version(Some(1)), 2);
        assert_eq!(next_version(Some(7)), 8);
    }

    #[test]
    fn rollback_requires_a_predecessor() {
        assert!(matches!(rollback_target(1), Err(NotifyError::Usage(_))));
        assert!(matches!(rollback_target(0), Err(NotifyError::Usage(_))));
        assert_eq!(rollback_target(2).unwrap(), 1);
        assert_eq!(rollback_target(5).unwrap(), 4);
    }

    #[test]
    fn fallbacks_cover_every_type() {
        for t in NotificationType::ALL {
            let fields = fallback_fields(t);
            assert!(fields.subject.is_some(), "{} missing subject", t.as_str());
            assert!(fields.in_app_template.is_some());
            assert!(fields.push_body.is_some());
            assert!(fields.sms_template.is_some());
        }
    }

    #[test]
    fn render_fields_skips_absent_bodies() {
        let fields = TemplateFields {
            subject: Some("Hi {{name}}".to_string()),
            ..Default::default()
        };
        let rendered = render_fields(&fields, &json!({ "name": "Ana" }));
        assert_eq!(rendered.subject.as_deref(), Some("Hi Ana"));
        assert!(rendered.html_body.is_none());
        assert!(rendered.sms.is_none());
    }

    #[test]
    fn fallback_renders_with_empty_context() {
        let fields = fallback_fields(NotificationType::NewApplication);
        let rendered = render_fields(&fields, &json!({}));
        assert_eq!(
            rendered.subject.as_deref(),
            Some("New application for your posting")
        );
    }
}
