use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};
use worklink_config::SmtpSettings;

use super::SendOutcome;
use crate::notify::engine::RenderedContent;

/// SMTP delivery of rendered email content. Every outgoing mail carries a
/// one-click unsubscribe link built from the recipient's opaque token.
pub struct EmailSender {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_address: String,
    unsubscribe_base_url: String,
}

impl EmailSender {
    /// Without an SMTP host the sender stays constructed but inert; sends
    /// report a transient failure so the aggregate status is honest.
    pub fn new(settings: &SmtpSettings, unsubscribe_base_url: String) -> Self {
        let transport = settings.host.as_deref().and_then(|host| {
            let builder = match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host) {
                Ok(b) => b.port(settings.port),
                Err(e) => {
                    warn!(%e, host, "Invalid SMTP relay configuration");
                    return None;
                }
            };
            let builder = match (&settings.username, &settings.password) {
                (Some(user), Some(pass)) => {
                    builder.credentials(Credentials::new(user.clone(), pass.clone()))
                }
                _ => builder,
            };
            Some(builder.build())
        });

        Self {
            transport,
            from_address: settings.from_address.clone(),
            unsubscribe_base_url,
        }
    }

    pub async fn send(
        &self,
        to_email: &str,
        content: &RenderedContent,
        unsubscribe_token: &str,
    ) -> SendOutcome {
        let Some(transport) = &self.transport else {
            return SendOutcome::Failed {
                error: "SMTP is not configured".to_string(),
            };
        };

        let from: Mailbox = match self.from_address.parse() {
            Ok(m) => m,
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("Invalid from address: {e}"),
                };
            }
        };
        // An unparseable recipient can never be delivered to; treat it like a
        // dead endpoint rather than retrying.
        let to: Mailbox = match to_email.parse() {
            Ok(m) => m,
            Err(e) => {
                return SendOutcome::InvalidTarget {
                    code: format!("bad_address: {e}"),
                };
            }
        };

        let subject = content.subject.clone().unwrap_or_else(|| "Notification".to_string());
        let unsubscribe_link = self.unsubscribe_link(unsubscribe_token);

        let text = content
            .text_body
            .clone()
            .map(|b| format!("{b}\n\nUnsubscribe: {unsubscribe_link}"));
        let html = content
            .html_body
            .clone()
            .map(|b| format!("{b}<p><a href=\"{unsubscribe_link}\">Unsubscribe</a></p>"));

        let builder = Message::builder().from(from).to(to).subject(subject);
        let message = match (text, html) {
            (Some(text), Some(html)) => {
                builder.multipart(MultiPart::alternative_plain_html(text, html))
            }
            (Some(text), None) => builder.singlepart(SinglePart::plain(text)),
            (None, Some(html)) => builder.singlepart(SinglePart::html(html)),
            (None, None) => builder.singlepart(SinglePart::plain(format!(
                "You have a new notification.\n\nUnsubscribe: {unsubscribe_link}"
            ))),
        };
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("Failed to build email: {e}"),
                };
            }
        };

        match transport.send(message).await {
            Ok(response) => {
                debug!(to = to_email, "Email accepted by SMTP relay");
                SendOutcome::Sent {
                    provider_message_id: response.message().next().map(|s| s.to_string()),
                }
            }
            // Permanent SMTP rejections (5xx) usually mean the mailbox is
            // gone; do not retry into a reputation problem.
            Err(e) if e.is_permanent() => SendOutcome::InvalidTarget {
                code: format!("smtp_permanent: {e}"),
            },
            Err(e) => SendOutcome::Failed {
                error: format!("SMTP error: {e}"),
            },
        }
    }

    fn unsubscribe_link(&self, token: &str) -> String {
        format!(
            "{}/{}?channel=email",
            self.unsubscribe_base_url.trim_end_matches('/'),
            urlencoding::encode(token)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> EmailSender {
        EmailSender::new(
            &SmtpSettings {
                host: None,
                port: 587,
                from_address: "no-reply@worklink.local".to_string(),
                username: None,
                password: None,
            },
            "https://worklink.example/api/unsubscribe".to_string(),
        )
    }

    #[tokio::test]
    async fn unconfigured_smtp_reports_transient_failure() {
        let outcome = sender()
            .send("ana@example.com", &RenderedContent::default(), "tok")
            .await;
        assert!(matches!(outcome, SendOutcome::Failed { .. }));
    }

    #[test]
    fn unsubscribe_link_encodes_token() {
        let link = sender().unsubscribe_link("a b/c");
        assert_eq!(
            link,
            "https://worklink.example/api/unsubscribe/a%20b%2Fc?channel=email"
        );
    }
}
