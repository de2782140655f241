//! HTTP service exposing the hindsight memory engine.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use hindsight_core::backends::{
    HttpEmbedder, InMemoryKvCache, InMemoryRecordStore, InMemoryVectorIndex, MeilisearchStore,
    QdrantIndex,
};
use hindsight_core::{Embedder, KvCache, MemoryEngine, RecordStore, VectorIndex};

mod api;
mod core;
mod middleware;
mod models;

use crate::core::config::Settings;
use crate::core::state::{ApiStats, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let settings = Settings::new()?;
    let app = create_app(&settings).await?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("hindsight API listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn create_app(settings: &Settings) -> Result<Router> {
    let engine = build_engine(settings).await?;
    let state = AppState {
        engine: Arc::new(engine),
        stats: Arc::new(ApiStats::new()),
    };
    Ok(build_router(state))
}

fn build_router(state: AppState) -> Router {
    let context_routes = Router::new()
        .route("/v1/context", post(api::context::generate_context))
        .with_state(state.clone());

    let memory_routes = Router::new()
        .route("/v1/memories", post(api::memories::add_memory))
        .route("/v1/memories/search", get(api::memories::search_memories))
        .route("/v1/memories/:id", delete(api::memories::delete_memory))
        .with_state(state.clone());

    let preference_routes = Router::new()
        .route("/v1/preferences", post(api::preferences::add_preference))
        .route("/v1/profile", get(api::preferences::get_profile))
        .with_state(state.clone());

    let session_routes = Router::new()
        .route("/v1/sessions", get(api::sessions::list_sessions))
        .route("/v1/sessions", post(api::sessions::begin_session))
        .route("/v1/sessions/:id/end", post(api::sessions::end_session))
        .with_state(state.clone());

    let status_routes = Router::new()
        .route("/v1/status", get(api::status::get_status))
        .route("/stats", get(api::status::get_stats))
        .with_state(state);

    // Layers run outermost-last, so the request id is minted before the
    // outcome logger reads it.
    Router::new()
        .route("/health", get(health_check))
        .merge(context_routes)
        .merge(memory_routes)
        .merge(preference_routes)
        .merge(session_routes)
        .merge(status_routes)
        .layer(axum::middleware::from_fn(
            middleware::error_handler::log_outcomes,
        ))
        .layer(axum::middleware::from_fn(
            middleware::request_id::propagate_request_id,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Wire the engine from settings. Disabled backends get in-memory
/// stand-ins; enabled ones are initialized best-effort, since a dead
/// backend at boot must not keep the service down.
async fn build_engine(settings: &Settings) -> Result<MemoryEngine> {
    let records: Arc<dyn RecordStore> = if settings.backends.meilisearch.enabled {
        let store = MeilisearchStore::new(&settings.meilisearch_config())?;
        if let Err(e) = store.init_indexes().await {
            warn!(error = %e, "meilisearch index setup failed, continuing degraded");
        }
        Arc::new(store)
    } else {
        info!("meilisearch disabled, using in-memory record store");
        Arc::new(InMemoryRecordStore::new())
    };

    let vectors: Arc<dyn VectorIndex> = if settings.backends.qdrant.enabled {
        let index = QdrantIndex::new(&settings.qdrant_config())?;
        if let Err(e) = index.ensure_collection().await {
            warn!(error = %e, "qdrant collection setup failed, continuing degraded");
        }
        Arc::new(index)
    } else {
        info!("qdrant disabled, using in-memory vector index");
        Arc::new(InMemoryVectorIndex::new())
    };

    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(&settings.embedder_config())?);
    let kv: Arc<dyn KvCache> = Arc::new(InMemoryKvCache::new());

    Ok(MemoryEngine::new(
        settings.engine_config(),
        records,
        vectors,
        embedder,
        kv,
    ))
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use hindsight_core::{EmbedderConfig, EngineConfig};
    use serde_json::{Value, json};

    // In-memory backends plus an embedder pointed at a closed port, the
    // same shape `build_engine` produces with everything disabled.
    fn test_server() -> TestServer {
        let embedder = HttpEmbedder::new(&EmbedderConfig {
            url: "http://127.0.0.1:9".to_string(),
            dimension: 4,
            request_timeout_ms: 100,
        })
        .unwrap();
        let engine = MemoryEngine::new(
            EngineConfig::default(),
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(embedder),
            Arc::new(InMemoryKvCache::new()),
        );
        let state = AppState {
            engine: Arc::new(engine),
            stats: Arc::new(ApiStats::new()),
        };
        TestServer::new(build_router(state)).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let server = test_server();
        let response = server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "OK");
    }

    #[tokio::test]
    async fn context_caches_until_a_write_lands() {
        let server = test_server();

        server
            .post("/v1/memories")
            .json(&json!({"content": "moved auth to middleware", "project": "api"}))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let first: Value = server
            .post("/v1/context")
            .json(&json!({"project": "api"}))
            .await
            .json();
        assert_eq!(first["cache_hit"], false);
        assert!(first["context"].as_str().unwrap().contains("moved auth"));

        let second: Value = server
            .post("/v1/context")
            .json(&json!({"project": "api"}))
            .await
            .json();
        assert_eq!(second["cache_hit"], true);
        assert_eq!(second["context"], first["context"]);

        server
            .post("/v1/memories")
            .json(&json!({"content": "added request ids", "project": "api"}))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let third: Value = server
            .post("/v1/context")
            .json(&json!({"project": "api"}))
            .await
            .json();
        assert_eq!(third["cache_hit"], false);
        assert!(third["context"].as_str().unwrap().contains("request ids"));
    }

    #[tokio::test]
    async fn search_degrades_without_the_embedder() {
        let server = test_server();
        server
            .post("/v1/memories")
            .json(&json!({"content": "tuned retrieval deadlines", "project": "api"}))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let response = server
            .get("/v1/memories/search")
            .add_query_param("query", "retrieval")
            .add_query_param("project", "api")
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["source"], "lexical");
        let degraded: Vec<String> = body["degraded"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert_eq!(degraded, vec!["embedder"]);
    }

    #[tokio::test]
    async fn blank_project_is_a_client_error() {
        let server = test_server();
        let response = server
            .post("/v1/context")
            .json(&json!({"project": "   "}))
            .await;
        response.assert_status(axum::http::StatusCode::BAD_REQUEST);

        let body: Value = response.json();
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn deleting_an_unknown_memory_is_404() {
        let server = test_server();
        let response = server.delete("/v1/memories/no-such-id").await;
        response.assert_status(axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preference_shows_up_in_profile_and_context() {
        let server = test_server();
        server
            .post("/v1/preferences")
            .json(&json!({"text": "prefer small focused diffs", "static": true}))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let profile: Value = server.get("/v1/profile").await.json();
        assert_eq!(profile["static"][0], "prefer small focused diffs");
        assert_eq!(profile["dynamic"].as_array().unwrap().len(), 0);

        let context: Value = server
            .post("/v1/context")
            .json(&json!({"project": "api"}))
            .await
            .json();
        assert!(
            context["context"]
                .as_str()
                .unwrap()
                .contains("prefer small focused diffs")
        );
    }

    #[tokio::test]
    async fn session_lifecycle_over_http() {
        let server = test_server();
        server
            .post("/v1/sessions")
            .json(&json!({"session_id": "s1", "project": "api"}))
            .await
            .assert_status_ok();

        server
            .post("/v1/sessions/s1/end")
            .json(&json!({"project": "api", "summary": "wired up the new cache tier"}))
            .await
            .assert_status_ok();

        let body: Value = server.get("/v1/sessions").await.json();
        assert_eq!(body["count"], 1);
        assert_eq!(body["sessions"][0]["id"], "s1");
        assert_eq!(body["sessions"][0]["active"], false);
        assert_eq!(
            body["sessions"][0]["summary"],
            "wired up the new cache tier"
        );
    }

    #[tokio::test]
    async fn status_reports_partial_degradation() {
        let server = test_server();
        let body: Value = server.get("/v1/status").await.json();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["backends"]["record_store"], true);
        assert_eq!(body["backends"]["vector_index"], true);
        assert_eq!(body["backends"]["embedder"], false);
        assert_eq!(body["backends"]["cache"], true);
    }

    #[tokio::test]
    async fn stats_count_requests_and_cache_activity() {
        let server = test_server();
        server
            .post("/v1/context")
            .json(&json!({"project": "api"}))
            .await
            .assert_status_ok();
        server
            .post("/v1/context")
            .json(&json!({"project": "api"}))
            .await
            .assert_status_ok();

        let body: Value = server.get("/stats").await.json();
        assert_eq!(body["api"]["context_requests"], 2);
        assert_eq!(body["cache"]["hits"], 1);
        assert_eq!(body["cache"]["misses"], 1);
    }
}
