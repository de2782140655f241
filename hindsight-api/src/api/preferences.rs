//! Profile endpoints: preference writes and profile reads.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::core::state::AppState;
use crate::models::ApiResult;

fn default_static() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AddPreferenceRequest {
    pub text: String,
    /// Static entries persist with a sliding 7-day TTL; dynamic entries
    /// roll through a capped window instead.
    #[serde(default = "default_static")]
    pub r#static: bool,
}

#[derive(Debug, Serialize)]
pub struct AddPreferenceResponse {
    pub saved: bool,
    pub r#static: bool,
}

/// POST /v1/preferences
pub async fn add_preference(
    State(state): State<AppState>,
    Json(req): Json<AddPreferenceRequest>,
) -> ApiResult<impl IntoResponse> {
    state.engine.add_preference(&req.text, req.r#static).await?;
    Ok((
        StatusCode::CREATED,
        Json(AddPreferenceResponse {
            saved: true,
            r#static: req.r#static,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub r#static: Vec<String>,
    pub dynamic: Vec<String>,
}

/// GET /v1/profile
pub async fn get_profile(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let profile = state.engine.get_profile().await?;
    Ok(Json(ProfileResponse {
        r#static: profile.static_prefs,
        dynamic: profile.dynamic,
    }))
}
