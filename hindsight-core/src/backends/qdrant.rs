//! Qdrant-backed vector index, speaking the REST API via `reqwest`.
//!
//! Points are keyed by the memory's UUID and carry the memory payload,
//! so semantic hits come back self-contained and never need a second
//! lookup against the record store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::QdrantConfig;
use crate::error::{EngineError, Result};
use crate::models::{Backend, Memory, MemoryType, VectorHit};
use crate::ports::VectorIndex;

#[derive(Debug, Serialize, Deserialize)]
struct PointPayload {
    content: String,
    project: Option<String>,
    memory_type: MemoryType,
    session_id: Option<String>,
    created_at: i64,
}

impl From<&Memory> for PointPayload {
    fn from(memory: &Memory) -> Self {
        Self {
            content: memory.content.clone(),
            project: memory.project.clone(),
            memory_type: memory.memory_type,
            session_id: memory.session_id.clone(),
            created_at: memory.created_at.timestamp(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    score_threshold: f32,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: String,
    score: f32,
    payload: Option<PointPayload>,
}

pub struct QdrantIndex {
    http: reqwest::Client,
    base_url: String,
    collection: String,
    vector_size: usize,
}

impl QdrantIndex {
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Config(format!("qdrant http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            vector_size: config.vector_size,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Creates the collection if it does not exist. Idempotent, meant to
    /// run once at startup.
    pub async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .http
            .get(self.collection_url())
            .send()
            .await
            .map_err(|e| EngineError::backend(Backend::VectorIndex, e))?
            .status()
            .is_success();
        if exists {
            return Ok(());
        }

        let body = json!({
            "vectors": { "size": self.vector_size, "distance": "Cosine" }
        });
        self.http
            .put(self.collection_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::backend(Backend::VectorIndex, e))?
            .error_for_status()
            .map_err(|e| EngineError::backend(Backend::VectorIndex, e))?;
        debug!(collection = %self.collection, size = self.vector_size, "qdrant collection created");
        Ok(())
    }

    /// Scoped searches still admit cross-project points, which carry a
    /// null `project` payload field.
    fn project_filter(project: Option<&str>) -> Option<serde_json::Value> {
        project.map(|p| {
            json!({
                "should": [
                    { "key": "project", "match": { "value": p } },
                    { "is_null": { "key": "project" } },
                ]
            })
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(
        &self,
        embedding: &[f32],
        project: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>> {
        let request = SearchRequest {
            vector: embedding,
            limit,
            score_threshold: min_score,
            with_payload: true,
            filter: Self::project_filter(project),
        };
        let response: SearchResponse = self
            .http
            .post(format!("{}/points/search", self.collection_url()))
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::backend(Backend::VectorIndex, e))?
            .error_for_status()
            .map_err(|e| EngineError::backend(Backend::VectorIndex, e))?
            .json()
            .await
            .map_err(|e| EngineError::backend(Backend::VectorIndex, e))?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| {
                let Some(payload) = point.payload else {
                    // Payload-less points are stale partial writes; skip them.
                    debug!(point_id = %point.id, "qdrant hit without payload, skipping");
                    return None;
                };
                Some(VectorHit {
                    memory_id: point.id,
                    content: payload.content,
                    project: payload.project,
                    memory_type: payload.memory_type,
                    created_at: DateTime::from_timestamp(payload.created_at, 0)
                        .unwrap_or_default(),
                    score: point.score,
                })
            })
            .collect();
        Ok(hits)
    }

    async fn upsert(&self, memory: &Memory, embedding: &[f32]) -> Result<()> {
        let body = json!({
            "points": [{
                "id": memory.id,
                "vector": embedding,
                "payload": PointPayload::from(memory),
            }]
        });
        self.http
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::backend(Backend::VectorIndex, e))?
            .error_for_status()
            .map_err(|e| EngineError::backend(Backend::VectorIndex, e))?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let body = json!({ "points": [id] });
        self.http
            .post(format!(
                "{}/points/delete?wait=true",
                self.collection_url()
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::backend(Backend::VectorIndex, e))?
            .error_for_status()
            .map_err(|e| EngineError::backend(Backend::VectorIndex, e))?;
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        match self
            .http
            .get(format!("{}/collections", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
