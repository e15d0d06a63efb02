//! Health check endpoint

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::error::Result;
use crate::models::response::HealthResponse;
use crate::state::AppState;

/// Liveness probe: reports the store's reachability and the in-process
/// metric counters.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>> {
    let database = state.db.health_check().await.is_ok();

    Ok(Json(HealthResponse {
        status: if database { "healthy" } else { "degraded" }.to_string(),
        version: state.version.clone(),
        timestamp: chrono::Utc::now().timestamp(),
        database,
        metrics: state.metrics.snapshot(),
    }))
}
