use mongodb::Database;
use std::sync::Arc;
use worklink_config::Settings;
use worklink_services::{
    AuthService, NotifyService,
    dao::{
        device_token::DeviceTokenDao, notification::NotificationDao, preference::PreferenceDao,
        template::TemplateDao,
    },
    notify::{TemplateEngine, fanout::LiveEvents, session::SessionRegistry},
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settings: Settings,
    pub auth: Arc<AuthService>,
    pub notifications: Arc<NotificationDao>,
    pub preferences: Arc<PreferenceDao>,
    pub templates: Arc<TemplateDao>,
    pub device_tokens: Arc<DeviceTokenDao>,
    pub engine: Arc<TemplateEngine>,
    pub notify: Arc<NotifyService>,
    pub sessions: Arc<SessionRegistry>,
    pub events: Arc<LiveEvents>,
}

impl AppState {
    pub fn new(db: Database, settings: Settings, events: Arc<LiveEvents>) -> Self {
        let auth = Arc::new(AuthService::new(&settings.jwt));
        let notifications = Arc::new(NotificationDao::new(&db));
        let preferences = Arc::new(PreferenceDao::new(&db));
        let templates = Arc::new(TemplateDao::new(&db));
        let device_tokens = Arc::new(DeviceTokenDao::new(&db));
        let engine = Arc::new(TemplateEngine::new(
            templates.clone(),
            settings.notify.default_language.clone(),
        ));
        let sessions = events.sessions().clone();
        let notify = NotifyService::new(&db, &settings, engine.clone(), events.clone());

        Self {
            db,
            settings,
            auth,
            notifications,
            preferences,
            templates,
            device_tokens,
            engine,
            notify,
            sessions,
            events,
        }
    }
}
