//! Session listing and lifecycle endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hindsight_core::Session;

use crate::core::state::AppState;
use crate::models::ApiResult;

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsParams {
    pub project: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub project_path: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub token_count: u64,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        let active = session.is_active();
        Self {
            id: session.id,
            project_path: session.project_path,
            started_at: session.started_at,
            ended_at: session.ended_at,
            message_count: session.message_count,
            token_count: session.token_count,
            active,
            summary: session.summary,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionSummary>,
}

/// GET /v1/sessions?project=...&limit=...
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListSessionsParams>,
) -> ApiResult<impl IntoResponse> {
    let sessions = state
        .engine
        .list_sessions(params.project.as_deref(), params.limit)
        .await?;
    let sessions: Vec<SessionSummary> = sessions.into_iter().map(SessionSummary::from).collect();
    Ok(Json(ListSessionsResponse {
        count: sessions.len(),
        sessions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BeginSessionRequest {
    pub session_id: String,
    pub project: String,
}

#[derive(Debug, Serialize)]
pub struct SessionLifecycleResponse {
    pub session_id: String,
    pub status: &'static str,
}

/// POST /v1/sessions
pub async fn begin_session(
    State(state): State<AppState>,
    Json(req): Json<BeginSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .engine
        .begin_session(&req.session_id, &req.project)
        .await?;
    Ok(Json(SessionLifecycleResponse {
        session_id: req.session_id,
        status: "started",
    }))
}

#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    pub project: String,
    pub summary: Option<String>,
}

/// POST /v1/sessions/:id/end
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<EndSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .engine
        .end_session(&session_id, &req.project, req.summary.as_deref())
        .await?;
    Ok(Json(SessionLifecycleResponse {
        session_id,
        status: "ended",
    }))
}
