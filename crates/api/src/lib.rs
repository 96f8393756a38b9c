pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Notification routes
    let notification_routes = Router::new()
        .route("/", get(routes::notification::list))
        .route("/", post(routes::notification::send))
        .route("/unread-count", get(routes::notification::unread_count))
        .route("/read-all", put(routes::notification::mark_all_read))
        .route("/{notification_id}", get(routes::notification::get))
        .route("/{notification_id}", delete(routes::notification::delete))
        .route("/{notification_id}/read", put(routes::notification::mark_read));

    // Preference routes
    let preference_routes = Router::new()
        .route("/", get(routes::preference::get))
        .route("/", put(routes::preference::update))
        .route("/reset", post(routes::preference::reset));

    // Template admin routes
    let template_routes = Router::new()
        .route("/", get(routes::template::list))
        .route("/", post(routes::template::upsert))
        .route("/render", post(routes::template::render))
        .route("/type/{type_name}", get(routes::template::list_by_type))
        .route("/{template_id}", get(routes::template::get))
        .route("/{template_id}", put(routes::template::update))
        .route("/{template_id}", delete(routes::template::delete))
        .route("/{template_id}/rollback", post(routes::template::rollback));

    // Device token routes
    let device_routes = Router::new()
        .route("/", get(routes::device_token::list))
        .route("/", post(routes::device_token::register))
        .route("/", delete(routes::device_token::deactivate_all))
        .route("/stats", get(routes::device_token::stats))
        .route("/{token_id}", delete(routes::device_token::deactivate));

    // Public unsubscribe (token is the credential)
    let unsubscribe_routes = Router::new()
        .route("/{token}", get(routes::preference::unsubscribe))
        .route("/{token}", post(routes::preference::unsubscribe));

    // Compose API
    let api = Router::new()
        .nest("/notification", notification_routes)
        .nest("/preference", preference_routes)
        .nest("/template", template_routes)
        .nest("/device", device_routes)
        .nest("/unsubscribe", unsubscribe_routes);

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .route("/ws", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
