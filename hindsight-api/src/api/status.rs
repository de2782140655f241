//! Health, status and stats endpoints.

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use hindsight_core::{CacheStats, EngineStatus};

use crate::core::state::{ApiStatsSnapshot, AppState};
use crate::models::ApiResult;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub backends: EngineStatus,
    pub version: &'static str,
}

/// GET /v1/status
///
/// Probes all four backends concurrently. Reports "degraded" rather
/// than failing when any probe comes back dead.
pub async fn get_status(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let backends = state.engine.status().await;
    let status = if backends.all_healthy() {
        "ok"
    } else {
        "degraded"
    };
    Ok(Json(StatusResponse {
        status,
        backends,
        version: env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub api: ApiStatsSnapshot,
    pub cache: CacheStats,
    pub version: &'static str,
}

/// GET /stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(StatsResponse {
        api: state.stats.snapshot(),
        cache: state.engine.cache_stats(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}
