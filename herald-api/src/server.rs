use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::env;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing;

use crate::auth;
use crate::handlers;
use crate::hooks;
use crate::state::ApiState;

fn cors_layer() -> CorsLayer {
    // Comma-separated allow list; permissive when unset
    if let Ok(origins) = env::var("CORS_ORIGINS") {
        let mut cors = CorsLayer::new();
        for origin in origins.split(',').map(|s| s.trim()) {
            if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                cors = cors.allow_origin(parsed);
            }
        }
        cors.allow_methods(Any).allow_headers(Any)
    } else {
        tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
        CorsLayer::permissive()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/device-tokens", post(handlers::register_device_token))
        .route("/api/v1/device-tokens/:token", delete(handlers::unregister_device_token))
        .route("/api/v1/notifications", get(handlers::get_notifications))
        .route("/api/v1/notifications/unread-count", get(handlers::get_unread_count))
        .route("/api/v1/notifications/read-all", post(handlers::mark_all_notifications_read))
        .route("/api/v1/notifications/:id/read", post(handlers::mark_notification_read))
        .route("/api/v1/preferences", get(handlers::get_preferences).post(handlers::update_preferences))
        .route("/api/v1/reminders", get(handlers::list_reminders).post(handlers::create_reminder))
        .route("/api/v1/reminders/:id", put(handlers::update_reminder).delete(handlers::delete_reminder))
        .route("/api/v1/reminders/:id/snooze", post(handlers::snooze_reminder))
        .route("/internal/v1/domain-events", post(hooks::receive_domain_event))
        .layer(
            ServiceBuilder::new()
                .layer(cors_layer())
                .map_response(|res: axum::http::Response<_>| res.map(axum::body::Body::new))
                .layer(TraceLayer::new_for_http())
                .layer(Extension(state))
                .layer(middleware::from_fn(auth::auth_middleware)),
        )
}

/// Serves the API until `cancel` fires, then drains in-flight requests.
pub async fn run(state: ApiState, cancel: CancellationToken) -> Result<()> {
    let server = &state.ctx.config.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.api_port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", server.host, server.api_port))?;

    let app = router(state);

    tracing::info!("Starting API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}
