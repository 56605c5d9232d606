//! System API endpoints.

use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, SystemStatus};

#[derive(Debug, Serialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
}

/// GET /api/system/status
///
/// Version, uptime, and database reachability.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SystemStatus>>, ApiError> {
    let database = state.store().ping().await.is_ok();

    Ok(Json(ApiResponse::success(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        database,
    })))
}

/// GET /api/health/live
///
/// Liveness probe; answers as long as the process is serving requests.
pub async fn health_live() -> Json<HealthLiveResponse> {
    Json(HealthLiveResponse { status: "ok" })
}
