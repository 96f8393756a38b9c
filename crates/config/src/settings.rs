use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub redis: RedisSettings,
    pub smtp: SmtpSettings,
    pub push: PushSettings,
    pub sms: SmsSettings,
    pub notify: NotifySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
    /// Cross-instance WebSocket fan-out. Off for single-instance deployments.
    pub fanout_enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpSettings {
    pub host: Option<String>,
    pub port: u16,
    pub from_address: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmsSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub from_number: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifySettings {
    /// Base URL for one-click unsubscribe links embedded in emails.
    pub unsubscribe_base_url: String,
    pub default_language: String,
    pub queue_workers: usize,
    pub max_delivery_attempts: u32,
    /// Days of inactivity before the cleanup job hard-deletes a device token.
    pub token_retention_days: i64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("WORKLINK"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 3000)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("database.url", "mongodb://localhost:27017")?
            .set_default("database.name", "worklink")?
            .set_default("jwt.secret", "change-me-in-production")?
            .set_default("jwt.issuer", "worklink")?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.fanout_enabled", false)?
            .set_default("smtp.host", None::<String>)?
            .set_default("smtp.port", 587)?
            .set_default("smtp.from_address", "no-reply@worklink.local")?
            .set_default("smtp.username", None::<String>)?
            .set_default("smtp.password", None::<String>)?
            .set_default("push.endpoint", None::<String>)?
            .set_default("push.api_key", None::<String>)?
            .set_default("sms.endpoint", None::<String>)?
            .set_default("sms.api_key", None::<String>)?
            .set_default("sms.from_number", None::<String>)?
            .set_default("notify.unsubscribe_base_url", "http://localhost:3000/api/unsubscribe")?
            .set_default("notify.default_language", "en")?
            .set_default("notify.queue_workers", 4)?
            .set_default("notify.max_delivery_attempts", 3)?
            .set_default("notify.token_retention_days", 90)?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::load().expect("Failed to load default settings")
    }
}
