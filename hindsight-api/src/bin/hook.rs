//! Session lifecycle hook for coding assistants.
//!
//! Reads one JSON event from stdin and performs the matching engine
//! action. On `SessionStart` the rendered context block is written to
//! stdout inside the hook output envelope; logs go to stderr so they
//! never pollute that channel. The process always exits 0, a broken
//! memory layer must never block a session from starting.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use hindsight_core::backends::{HttpEmbedder, InMemoryKvCache, MeilisearchStore, QdrantIndex};
use hindsight_core::{
    EmbedderConfig, EngineConfig, MeilisearchConfig, MemoryEngine, QdrantConfig,
};

const MAX_CONTEXT_ITEMS: usize = 10;

#[derive(Debug, Deserialize)]
struct HookEvent {
    #[serde(default)]
    hook_event_name: String,
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    cwd: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "hook failed");
    }
}

async fn run() -> Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    if input.trim().is_empty() {
        return Ok(());
    }
    let event: HookEvent = serde_json::from_str(&input)?;
    if event.session_id.is_empty() {
        warn!("hook event without a session id, ignoring");
        return Ok(());
    }

    let records = MeilisearchStore::new(&MeilisearchConfig::default())?;
    let vectors = QdrantIndex::new(&QdrantConfig::default())?;
    if event.hook_event_name == "SessionStart" {
        // Index setup is idempotent; skipping on error just means a
        // degraded first context.
        if let Err(e) = records.init_indexes().await {
            debug!(error = %e, "meilisearch init skipped");
        }
        if let Err(e) = vectors.ensure_collection().await {
            debug!(error = %e, "qdrant init skipped");
        }
    }

    // The cache tier is per-invocation here; only a long-lived service
    // gets cross-call hits.
    let engine = MemoryEngine::new(
        EngineConfig::default(),
        Arc::new(records),
        Arc::new(vectors),
        Arc::new(HttpEmbedder::new(&EmbedderConfig::default())?),
        Arc::new(InMemoryKvCache::new()),
    );

    let project = project_name(&event.cwd);
    match event.hook_event_name.as_str() {
        "SessionStart" => {
            engine.begin_session(&event.session_id, &project).await?;
            let block = engine
                .generate_context(&project, Some(&event.session_id), MAX_CONTEXT_ITEMS)
                .await?;
            let output = json!({
                "hookSpecificOutput": {
                    "hookEventName": "SessionStart",
                    "additionalContext": block.text,
                }
            });
            println!("{output}");
        }
        "SessionEnd" => {
            engine.end_session(&event.session_id, &project, None).await?;
        }
        "PostToolUse" => {
            // Best effort; the count only accumulates where the cache
            // substrate outlives the invocation.
            let count = engine.record_message(&event.session_id).await?;
            debug!(session_id = %event.session_id, count, "session activity recorded");
        }
        other => {
            debug!(event = other, "ignoring hook event");
        }
    }
    Ok(())
}

/// Derive the project name from the working directory: the enclosing
/// git root's directory name, or the directory's own name outside a
/// repository.
fn project_name(cwd: &str) -> String {
    let path = Path::new(cwd);
    for dir in path.ancestors() {
        if dir.join(".git").exists() {
            if let Some(name) = dir.file_name() {
                return name.to_string_lossy().into_owned();
            }
        }
    }
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}
