//! Memory write, search and delete endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hindsight_core::{Backend, MemoryType, NewMemory, RankedResult};

use crate::core::state::AppState;
use crate::models::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct AddMemoryRequest {
    pub content: String,
    pub project: Option<String>,
    #[serde(default)]
    pub memory_type: MemoryType,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddMemoryResponse {
    pub id: String,
    pub project: Option<String>,
    pub memory_type: MemoryType,
    pub created_at: DateTime<Utc>,
    /// False when the memory was stored durably but its embedding did
    /// not reach the vector index.
    pub indexed: bool,
}

/// POST /v1/memories
pub async fn add_memory(
    State(state): State<AppState>,
    Json(req): Json<AddMemoryRequest>,
) -> ApiResult<impl IntoResponse> {
    state.stats.count_memory_write();
    let stored = state
        .engine
        .add_memory(NewMemory {
            content: req.content,
            project: req.project,
            memory_type: req.memory_type,
            session_id: req.session_id,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AddMemoryResponse {
            id: stored.memory.id,
            project: stored.memory.project,
            memory_type: stored.memory.memory_type,
            created_at: stored.memory.created_at,
            indexed: stored.indexed,
        }),
    ))
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub project: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<RankedResult>,
    pub degraded: Vec<Backend>,
}

/// GET /v1/memories/search?query=...&project=...&limit=...
pub async fn search_memories(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<impl IntoResponse> {
    state.stats.count_search();
    let outcome = state
        .engine
        .search_memories(&params.query, params.project.as_deref(), params.limit)
        .await?;
    Ok(Json(SearchResponse {
        query: params.query,
        count: outcome.results.len(),
        results: outcome.results,
        degraded: outcome.degraded,
    }))
}

#[derive(Debug, Serialize)]
pub struct DeleteMemoryResponse {
    pub id: String,
    pub deleted: bool,
}

/// DELETE /v1/memories/:id
pub async fn delete_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state.engine.delete_memory(&id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("memory {id} not found")));
    }
    Ok(Json(DeleteMemoryResponse { id, deleted }))
}
