//! Engine tunables and backend endpoint settings.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default prefix for every cache key the engine writes.
pub const DEFAULT_KEY_PREFIX: &str = "hindsight";

/// Rendered context entries: 4 hours.
pub const DEFAULT_CONTEXT_TTL_SECS: u64 = 4 * 3600;
/// Session-active entries: 24 hours.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 3600;
/// Static preference set: 7 days, reset on every static write.
pub const DEFAULT_PROFILE_TTL_SECS: u64 = 7 * 24 * 3600;

/// Retrieval-path tuning.
///
/// Degradation is evaluated per call from these budgets. There is no
/// sticky circuit breaker: a backend that recovers is used again on the
/// very next call, and the per-query timeout caps what a flapping
/// backend can cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Budget for one backend sub-query, applied per stage.
    pub query_timeout_ms: u64,
    /// Hard ceiling for one retrieval call; sub-queries still running at
    /// the deadline are abandoned.
    pub overall_deadline_ms: u64,
    /// Similarity floor for semantic hits.
    pub min_semantic_score: f32,
    /// Fixed score assigned to lexical and recent-activity results.
    pub lexical_score: f64,
    /// Per-item character cap in the rendered block.
    pub max_item_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 1500,
            overall_deadline_ms: 4000,
            min_semantic_score: 0.5,
            lexical_score: 0.25,
            max_item_chars: 150,
        }
    }
}

impl RetrievalConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn overall_deadline(&self) -> Duration {
        Duration::from_millis(self.overall_deadline_ms)
    }

    pub fn with_query_timeout_ms(mut self, ms: u64) -> Self {
        self.query_timeout_ms = ms;
        self
    }

    pub fn with_overall_deadline_ms(mut self, ms: u64) -> Self {
        self.overall_deadline_ms = ms;
        self
    }

    pub fn with_min_semantic_score(mut self, score: f32) -> Self {
        self.min_semantic_score = score;
        self
    }
}

/// Expiry policy for the cache tier and profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    pub context_ttl_secs: u64,
    pub session_ttl_secs: u64,
    pub profile_ttl_secs: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            context_ttl_secs: DEFAULT_CONTEXT_TTL_SECS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            profile_ttl_secs: DEFAULT_PROFILE_TTL_SECS,
        }
    }
}

impl CacheTtlConfig {
    pub fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.context_ttl_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_secs)
    }

    pub fn with_context_ttl_secs(mut self, secs: u64) -> Self {
        self.context_ttl_secs = secs;
        self
    }

    pub fn with_profile_ttl_secs(mut self, secs: u64) -> Self {
        self.profile_ttl_secs = secs;
        self
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub key_prefix: KeyPrefix,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ttl: CacheTtlConfig,
}

impl EngineConfig {
    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn with_ttl(mut self, ttl: CacheTtlConfig) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Newtype so the prefix always defaults sensibly through serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPrefix(pub String);

impl Default for KeyPrefix {
    fn default() -> Self {
        Self(DEFAULT_KEY_PREFIX.to_string())
    }
}

impl KeyPrefix {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Meilisearch connection settings for the durable record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeilisearchConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub memories_index: String,
    pub sessions_index: String,
}

impl Default for MeilisearchConfig {
    fn default() -> Self {
        Self {
            url: env::var("MEILISEARCH_URL")
                .unwrap_or_else(|_| "http://localhost:7700".to_string()),
            api_key: env::var("MEILISEARCH_API_KEY").ok(),
            memories_index: "hindsight_memories".to_string(),
            sessions_index: "hindsight_sessions".to_string(),
        }
    }
}

/// Qdrant connection settings for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    pub collection: String,
    pub vector_size: usize,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string()),
            collection: "hindsight_memories".to_string(),
            vector_size: 384,
        }
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    pub url: String,
    pub dimension: usize,
    /// Transport-level timeout for the HTTP client. The orchestrator
    /// applies its own per-stage budget on top.
    pub request_timeout_ms: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            url: env::var("EMBEDDER_URL").unwrap_or_else(|_| "http://localhost:8008".to_string()),
            dimension: 384,
            request_timeout_ms: 5000,
        }
    }
}
