//! Worker pool endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use timelapse_core::pipeline::{Stage, WorkerInfo};

use super::handlers::{error_response, pipeline_error, ApiError, MessageResponse};
use crate::metrics::{outcome, WORKER_CHANGES_REQUESTED};
use crate::state::AppState;

/// Workers of every stage.
#[derive(Debug, Serialize)]
pub struct WorkersResponse {
    pub download: Vec<WorkerInfo>,
    pub render: Vec<WorkerInfo>,
    pub save: Vec<WorkerInfo>,
}

#[derive(Debug, Deserialize)]
pub struct CountQuery {
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    1
}

pub async fn list_all(State(state): State<Arc<AppState>>) -> Json<WorkersResponse> {
    let generator = state.generator();
    Json(WorkersResponse {
        download: generator.pool_snapshot(Stage::Download),
        render: generator.pool_snapshot(Stage::Render),
        save: generator.pool_snapshot(Stage::Save),
    })
}

pub async fn list_stage(
    State(state): State<Arc<AppState>>,
    Path(stage): Path<Stage>,
) -> Json<Vec<WorkerInfo>> {
    Json(state.generator().pool_snapshot(stage))
}

pub async fn add(
    State(state): State<Arc<AppState>>,
    Path(stage): Path<Stage>,
    Query(query): Query<CountQuery>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    if query.count == 0 {
        return Err(error_response(StatusCode::BAD_REQUEST, "count must be positive"));
    }
    let result = state.generator().add_workers(stage, query.count);
    WORKER_CHANGES_REQUESTED
        .with_label_values(&[stage.as_str(), "add", outcome(&result)])
        .inc_by(query.count as u64);
    result.map_err(pipeline_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!("Adding {} {} worker(s)", query.count, stage),
        }),
    ))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(stage): Path<Stage>,
    Query(query): Query<CountQuery>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    if query.count == 0 {
        return Err(error_response(StatusCode::BAD_REQUEST, "count must be positive"));
    }
    let result = state.generator().remove_workers(stage, query.count);
    WORKER_CHANGES_REQUESTED
        .with_label_values(&[stage.as_str(), "remove", outcome(&result)])
        .inc_by(query.count as u64);
    result.map_err(pipeline_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!("Removing {} {} worker(s)", query.count, stage),
        }),
    ))
}
