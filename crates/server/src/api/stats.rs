use axum::{extract::State, Json};
use std::sync::Arc;
use timelapse_core::StatsSnapshot;

use crate::state::AppState;

/// Last published generation statistics.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.generator().stats())
}
