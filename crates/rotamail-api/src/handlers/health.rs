//! Health and status handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rotamail_core::queue::QueueStats;
use serde::Serialize;
use std::sync::Arc;

use crate::handlers::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Basic health check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness check: verifies database connectivity
pub async fn readiness(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    match state.db_pool.health_check().await {
        Ok(()) => Ok(Json(HealthResponse {
            status: "ready".to_string(),
        })),
        Err(_) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable".to_string(),
            }),
        )),
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub queue: QueueStats,
}

/// Queue status
pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let queue = state.queue.get_stats().await?;
    Ok(Json(StatusResponse { queue }))
}
