//! Per-request outcome logging.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

use super::request_id::RequestId;

pub async fn log_outcomes(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let started = Instant::now();
    let response = next.run(req).await;
    let latency_ms = started.elapsed().as_millis() as u64;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        warn!(%method, path, request_id, status = status.as_u16(), latency_ms, "request failed");
    } else {
        info!(%method, path, request_id, status = status.as_u16(), latency_ms, "request completed");
    }
    response
}
