use serde_json::json;
use tracing::{debug, warn};
use worklink_config::SmsSettings;

use super::SendOutcome;

/// SMS delivery over a JSON HTTP gateway. Without a configured endpoint the
/// message is logged and treated as sent, which keeps development setups
/// working end to end.
pub struct SmsSender {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    from_number: Option<String>,
}

impl SmsSender {
    pub fn new(settings: &SmsSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            from_number: settings.from_number.clone(),
        }
    }

    pub async fn send(&self, to_number: &str, body: &str) -> SendOutcome {
        let Some(endpoint) = &self.endpoint else {
            debug!(to = to_number, body, "SMS gateway not configured, logging only");
            return SendOutcome::Sent {
                provider_message_id: None,
            };
        };

        let payload = json!({
            "to": to_number,
            "from": self.from_number,
            "body": body,
        });

        let mut request = self.client.post(endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("SMS gateway unreachable: {e}"),
                };
            }
        };

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("message_id").and_then(|m| m.as_str()).map(String::from));
            return SendOutcome::Sent {
                provider_message_id: message_id,
            };
        }

        let body_text = response.text().await.unwrap_or_default();
        // 400 on a phone number is almost always a malformed or dead number.
        if status == reqwest::StatusCode::BAD_REQUEST {
            warn!(to = to_number, %body_text, "SMS gateway rejected number");
            return SendOutcome::InvalidTarget {
                code: format!("rejected ({status})"),
            };
        }

        SendOutcome::Failed {
            error: format!("SMS gateway returned {status}: {body_text}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_gateway_logs_and_reports_sent() {
        let sender = SmsSender::new(&SmsSettings {
            endpoint: None,
            api_key: None,
            from_number: None,
        });
        let outcome = sender.send("+15550001111", "Your interview is tomorrow").await;
        assert_eq!(
            outcome,
            SendOutcome::Sent {
                provider_message_id: None
            }
        );
    }
}
