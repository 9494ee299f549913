//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/upload", post(handlers::upload_chunk))
        .route(
            "/status",
            get(handlers::get_status).post(handlers::post_status),
        )
        // Legacy name for the status endpoint
        .route(
            "/upload-status",
            get(handlers::get_status).post(handlers::post_status),
        )
        .route("/merge", post(handlers::merge_upload))
        .route("/purge", post(handlers::purge_upload))
        .route("/artifact", get(handlers::get_artifact))
        .route("/health", get(handlers::health_check));

    let mut router = Router::new().merge(upload_routes);

    // When enabled, restrict /metrics to the scraper at the network level.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
