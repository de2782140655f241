//! Context generation endpoint.

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use hindsight_core::Backend;

use crate::core::state::AppState;
use crate::models::ApiResult;

fn default_max_items() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub project: String,
    pub session_id: Option<String>,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub project: String,
    pub context: String,
    pub cache_hit: bool,
    pub degraded: Vec<Backend>,
}

/// POST /v1/context
pub async fn generate_context(
    State(state): State<AppState>,
    Json(req): Json<ContextRequest>,
) -> ApiResult<impl IntoResponse> {
    state.stats.count_context_request();
    let block = state
        .engine
        .generate_context(&req.project, req.session_id.as_deref(), req.max_items)
        .await?;
    Ok(Json(ContextResponse {
        project: req.project,
        context: block.text,
        cache_hit: block.cache_hit,
        degraded: block.degraded,
    }))
}
