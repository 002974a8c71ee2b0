use axum::{
    http::header,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::metrics_middleware;
use super::{generation, handlers, stats, workers, ws};
use crate::metrics::encode_metrics;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Generation
        .route("/generation/start", post(generation::start))
        .route("/generation/stop", post(generation::stop))
        // Worker pools
        .route("/workers", get(workers::list_all))
        .route("/workers/{stage}", get(workers::list_stage))
        .route("/workers/{stage}/add", post(workers::add))
        .route("/workers/{stage}/remove", post(workers::remove))
        // Statistics and events
        .route("/stats", get(stats::get_stats))
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .route("/metrics", get(metrics))
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
