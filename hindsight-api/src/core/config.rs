//! Layered service configuration.
//!
//! Defaults, then `config/{RUN_MODE}.toml`, then `config/local.toml`,
//! then `HINDSIGHT__`-prefixed environment variables, later layers
//! winning. `HINDSIGHT__SERVER__PORT=9000` overrides `server.port`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use hindsight_core::{
    CacheTtlConfig, EmbedderConfig, EngineConfig, MeilisearchConfig, QdrantConfig, RetrievalConfig,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub backends: BackendSettings,
    pub retrieval: RetrievalSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    pub meilisearch: MeilisearchSettings,
    pub qdrant: QdrantSettings,
    pub embedder: EmbedderSettings,
}

/// Disabled backends fall back to the in-memory implementations, which
/// keeps a single dev binary runnable with no services at all.
#[derive(Debug, Clone, Deserialize)]
pub struct MeilisearchSettings {
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub memories_index: String,
    pub sessions_index: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QdrantSettings {
    pub enabled: bool,
    pub url: String,
    pub collection: String,
    pub vector_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedderSettings {
    pub url: String,
    pub dimension: usize,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSettings {
    pub query_timeout_ms: u64,
    pub overall_deadline_ms: u64,
    pub min_semantic_score: f32,
    pub lexical_score: f64,
    pub max_item_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub context_ttl_secs: u64,
    pub session_ttl_secs: u64,
    pub profile_ttl_secs: u64,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .set_default("backends.meilisearch.enabled", false)?
            .set_default("backends.meilisearch.url", "http://localhost:7700")?
            .set_default("backends.meilisearch.memories_index", "hindsight_memories")?
            .set_default("backends.meilisearch.sessions_index", "hindsight_sessions")?
            .set_default("backends.qdrant.enabled", false)?
            .set_default("backends.qdrant.url", "http://localhost:6333")?
            .set_default("backends.qdrant.collection", "hindsight_memories")?
            .set_default("backends.qdrant.vector_size", 384)?
            .set_default("backends.embedder.url", "http://localhost:8008")?
            .set_default("backends.embedder.dimension", 384)?
            .set_default("backends.embedder.request_timeout_ms", 5000)?
            .set_default("retrieval.query_timeout_ms", 1500)?
            .set_default("retrieval.overall_deadline_ms", 4000)?
            .set_default("retrieval.min_semantic_score", 0.5)?
            .set_default("retrieval.lexical_score", 0.25)?
            .set_default("retrieval.max_item_chars", 150)?
            .set_default("cache.context_ttl_secs", 4 * 3600)?
            .set_default("cache.session_ttl_secs", 24 * 3600)?
            .set_default("cache.profile_ttl_secs", 7 * 24 * 3600)?
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("HINDSIGHT").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_retrieval(RetrievalConfig {
                query_timeout_ms: self.retrieval.query_timeout_ms,
                overall_deadline_ms: self.retrieval.overall_deadline_ms,
                min_semantic_score: self.retrieval.min_semantic_score,
                lexical_score: self.retrieval.lexical_score,
                max_item_chars: self.retrieval.max_item_chars,
            })
            .with_ttl(CacheTtlConfig {
                context_ttl_secs: self.cache.context_ttl_secs,
                session_ttl_secs: self.cache.session_ttl_secs,
                profile_ttl_secs: self.cache.profile_ttl_secs,
            })
    }

    pub fn meilisearch_config(&self) -> MeilisearchConfig {
        MeilisearchConfig {
            url: self.backends.meilisearch.url.clone(),
            api_key: self.backends.meilisearch.api_key.clone(),
            memories_index: self.backends.meilisearch.memories_index.clone(),
            sessions_index: self.backends.meilisearch.sessions_index.clone(),
        }
    }

    pub fn qdrant_config(&self) -> QdrantConfig {
        QdrantConfig {
            url: self.backends.qdrant.url.clone(),
            collection: self.backends.qdrant.collection.clone(),
            vector_size: self.backends.qdrant.vector_size,
        }
    }

    pub fn embedder_config(&self) -> EmbedderConfig {
        EmbedderConfig {
            url: self.backends.embedder.url.clone(),
            dimension: self.backends.embedder.dimension,
            request_timeout_ms: self.backends.embedder.request_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_without_any_config_files() {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8090);
        assert!(!settings.backends.meilisearch.enabled);
        assert!(!settings.backends.qdrant.enabled);

        let engine = settings.engine_config();
        assert_eq!(engine.retrieval.query_timeout_ms, 1500);
        assert_eq!(engine.ttl.context_ttl_secs, 4 * 3600);
    }
}
