use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worklink_api::{build_router, state::AppState};
use worklink_config::Settings;
use worklink_db::{connect, indexes::ensure_indexes};
use worklink_services::notify::{fanout::LiveEvents, session::SessionRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (silently ignore if missing)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "worklink_api=debug,worklink_services=debug,worklink_db=debug,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let settings = Settings::load()?;
    info!("Starting Worklink notifications on {}:{}", settings.app.host, settings.app.port);

    // Connect to MongoDB
    let db = connect(&settings).await?;

    // Ensure indexes
    ensure_indexes(&db).await?;

    // Live event fan-out: Redis pub/sub across instances when enabled,
    // process-local otherwise.
    let sessions = Arc::new(SessionRegistry::new());
    let events = if settings.redis.fanout_enabled {
        match LiveEvents::with_redis(sessions.clone(), &settings.redis.url).await {
            Ok(events) => Arc::new(events),
            Err(e) => {
                warn!(%e, "Redis fan-out unavailable, falling back to local-only delivery");
                Arc::new(LiveEvents::local_only(sessions.clone()))
            }
        }
    } else {
        Arc::new(LiveEvents::local_only(sessions.clone()))
    };

    // Build app state (starts the delivery queue workers)
    let app_state = AppState::new(db.clone(), settings.clone(), events);

    // Seed the version-0 fallback templates
    app_state.engine.ensure_fallbacks().await?;

    // Daily device token cleanup
    let _scheduler = worklink_services::background::start_scheduler(
        db,
        settings.notify.token_retention_days,
    )
    .await?;

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
