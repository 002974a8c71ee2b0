use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use timelapse_core::{PipelineError, SanitizedConfig};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a generator error to an HTTP status.
pub fn pipeline_error(e: PipelineError) -> ApiError {
    let status = match &e {
        PipelineError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        PipelineError::AlreadyRunning
        | PipelineError::NotRunning
        | PipelineError::PoolUnderflow { .. } => StatusCode::CONFLICT,
        PipelineError::TooManyRequested { .. } => StatusCode::TOO_MANY_REQUESTS,
        PipelineError::Mailbox(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use timelapse_core::pipeline::{MailboxError, Stage};

    #[test]
    fn test_pipeline_error_status() {
        assert_eq!(
            pipeline_error(PipelineError::InvalidConfig("x".to_string())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            pipeline_error(PipelineError::PoolUnderflow {
                stage: Stage::Save
            })
            .0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            pipeline_error(PipelineError::Mailbox(MailboxError::Closed)).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            pipeline_error(PipelineError::TooManyRequested {
                stage: Stage::Render,
                requested: 5000
            })
            .0,
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
