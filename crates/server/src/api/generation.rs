//! Generation start/stop endpoints.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use timelapse_core::GenerationConfig;
use tracing::info;

use super::handlers::{error_response, pipeline_error, ApiError, MessageResponse};
use crate::metrics::{outcome, GENERATION_REQUESTS};
use crate::state::AppState;

/// Start a generation.
///
/// The body is a full run config; without one the `[generation]` section of
/// the server config is used.
pub async fn start(
    State(state): State<Arc<AppState>>,
    body: Option<Json<GenerationConfig>>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let config = match body {
        Some(Json(config)) => config,
        None => state.default_generation().cloned().ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "No generation config given and none configured",
            )
        })?,
    };

    info!(repo = %config.repo_url, "Generation start requested");
    let result = state.generator().start_generation(config);
    GENERATION_REQUESTS
        .with_label_values(&["start", outcome(&result)])
        .inc();
    result.map_err(pipeline_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Generation starting".to_string(),
        }),
    ))
}

/// Stop the running generation.
pub async fn stop(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    info!("Generation stop requested");
    let result = state.generator().stop_generation();
    GENERATION_REQUESTS
        .with_label_values(&["stop", outcome(&result)])
        .inc();
    result.map_err(pipeline_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Generation stopping".to_string(),
        }),
    ))
}
