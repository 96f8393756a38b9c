use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};
use worklink_config::PushSettings;
use worklink_db::models::{DeviceToken, Platform};

use super::{BatchOutcome, SendOutcome};

/// Push gateway abstraction. The HTTP provider talks to the real gateway;
/// tests swap in a mock.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(
        &self,
        platform: Platform,
        token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> SendOutcome;

    fn name(&self) -> &'static str;
}

/// Delivers over a JSON HTTP gateway. Unregistered-token responses (404/410
/// or an UNREGISTERED error code) surface as invalid targets.
pub struct HttpPushProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpPushProvider {
    pub fn from_settings(settings: &PushSettings) -> Option<Self> {
        let endpoint = settings.endpoint.clone()?;
        Some(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl PushProvider for HttpPushProvider {
    async fn send(
        &self,
        platform: Platform,
        token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> SendOutcome {
        let payload = json!({
            "platform": platform.as_str(),
            "token": token,
            "title": title,
            "body": body,
            "data": data,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("Push gateway unreachable: {e}"),
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
        if status == reqwest::StatusCode::NOT_FOUND
            || status == reqwest::StatusCode::GONE
            || body_text.contains("UNREGISTERED")
        {
            return SendOutcome::InvalidTarget {
                code: format!("unregistered ({status})"),
            };
        }

        SendOutcome::Failed {
            error: format!("Push gateway returned {status}: {body_text}"),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Fans one rendered payload out to all of a user's active device tokens.
pub struct PushSender {
    provider: Option<Box<dyn PushProvider>>,
}

impl PushSender {
    pub fn new(provider: Option<Box<dyn PushProvider>>) -> Self {
        Self { provider }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// One dead token must not stop delivery to the user's other devices, so
    /// each token gets its own attempt and the results are aggregated.
    pub async fn send_batch(
        &self,
        tokens: &[DeviceToken],
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> BatchOutcome {
        let Some(provider) = &self.provider else {
            return BatchOutcome {
                failure_count: tokens.len(),
                first_error: Some("Push gateway is not configured".to_string()),
                ..Default::default()
            };
        };

        let mut outcome = BatchOutcome::default();
        for device in tokens {
            match provider
                .send(device.platform, &device.token, title, body, data)
                .await
            {
                SendOutcome::Sent { .. } => {
                    debug!(provider = provider.name(), token = %device.token, "Push delivered");
                    outcome.success_count += 1;
                }
                SendOutcome::InvalidTarget { code } => {
                    warn!(token = %device.token, %code, "Push token rejected as unregistered");
                    outcome.failure_count += 1;
                    outcome.invalid_targets.push(device.token.clone());
                }
                SendOutcome::Failed { error } => {
                    outcome.failure_count += 1;
                    outcome.first_error.get_or_insert(error);
                }
                SendOutcome::Deferred => {}
            }
        }
        outcome
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every send and rejects a configurable set of tokens.
    pub struct MockPushProvider {
        pub invalid_tokens: HashSet<String>,
        pub sent: Mutex<Vec<String>>,
    }

    impl MockPushProvider {
        pub fn new(invalid_tokens: &[&str]) -> Self {
            Self {
                invalid_tokens: invalid_tokens.iter().map(|s| s.to_string()).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PushProvider for MockPushProvider {
        async fn send(
            &self,
            _platform: Platform,
            token: &str,
            _title: &str,
            _body: &str,
            _data: &serde_json::Value,
        ) -> SendOutcome {
            if self.invalid_tokens.contains(token) {
                return SendOutcome::InvalidTarget {
                    code: "unregistered".to_string(),
                };
            }
            self.sent.lock().unwrap().push(token.to_string());
            SendOutcome::Sent {
                provider_message_id: Some(format!("mock-{token}")),
            }
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockPushProvider;
    use super::*;
    use bson::oid::ObjectId;

    fn device(token: &str) -> DeviceToken {
        let now = bson::DateTime::now();
        DeviceToken {
            id: Some(ObjectId::new()),
            user_id: ObjectId::new(),
            platform: Platform::Android,
            token: token.to_string(),
            device_model: None,
            os_version: None,
            app_version: None,
            is_active: true,
            last_used_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn invalid_token_is_listed_and_other_devices_still_delivered() {
        let sender = PushSender::new(Some(Box::new(MockPushProvider::new(&["dead"]))));
        let outcome = sender
            .send_batch(
                &[device("alive"), device("dead")],
                "Title",
                "Body",
                &serde_json::json!({}),
            )
            .await;

        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failure_count, 1);
        assert_eq!(outcome.invalid_targets, vec!["dead".to_string()]);
        assert!(outcome.any_success());
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_every_token() {
        let sender = PushSender::new(None);
        let outcome = sender
            .send_batch(&[device("a"), device("b")], "T", "B", &serde_json::json!({}))
            .await;

        assert_eq!(outcome.success_count, 0);
        assert_eq!(outcome.failure_count, 2);
        assert!(outcome.first_error.is_some());
        assert!(!outcome.any_success());
    }

    #[tokio::test]
    async fn empty_token_list_yields_empty_outcome() {
        let sender = PushSender::new(Some(Box::new(MockPushProvider::new(&[]))));
        let outcome = sender
            .send_batch(&[], "T", "B", &serde_json::json!({}))
            .await;
        assert_eq!(outcome.success_count, 0);
        assert_eq!(outcome.failure_count, 0);
    }
}
