//! End-to-end engine behavior over in-memory and scripted backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hindsight_core::backends::{InMemoryKvCache, InMemoryRecordStore, InMemoryVectorIndex};
use hindsight_core::{
    Backend, Embedder, EngineConfig, Memory, MemoryEngine, MemoryType, NewMemory, RecordStore,
    Result, ResultSource, RetrievalConfig, Session, VectorHit, VectorIndex,
};

struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0])
    }

    fn dimension(&self) -> usize {
        3
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Returns exactly the scripted hits that clear the requested floor.
struct ScriptedVectorIndex {
    hits: Vec<VectorHit>,
}

#[async_trait]
impl VectorIndex for ScriptedVectorIndex {
    async fn search(
        &self,
        _embedding: &[f32],
        _project: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>> {
        Ok(self
            .hits
            .iter()
            .filter(|h| h.score >= min_score)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn upsert(&self, _memory: &Memory, _embedding: &[f32]) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Delegates to an in-memory store after a fixed delay on read paths.
struct SlowRecordStore {
    inner: InMemoryRecordStore,
    delay: Duration,
}

#[async_trait]
impl RecordStore for SlowRecordStore {
    async fn save_memory(&self, memory: &Memory) -> Result<()> {
        self.inner.save_memory(memory).await
    }

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        self.inner.get_memory(id).await
    }

    async fn delete_memory(&self, id: &str) -> Result<bool> {
        self.inner.delete_memory(id).await
    }

    async fn recent_memories(&self, project: Option<&str>, limit: usize) -> Result<Vec<Memory>> {
        tokio::time::sleep(self.delay).await;
        self.inner.recent_memories(project, limit).await
    }

    async fn search_memories(
        &self,
        query: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        tokio::time::sleep(self.delay).await;
        self.inner.search_memories(query, project, limit).await
    }

    async fn record_session(&self, session: &Session) -> Result<()> {
        self.inner.record_session(session).await
    }

    async fn close_session(&self, session_id: &str, summary: Option<&str>) -> Result<()> {
        self.inner.close_session(session_id, summary).await
    }

    async fn recent_sessions(&self, project: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        self.inner.recent_sessions(project, limit).await
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

fn engine_with(
    records: Arc<dyn RecordStore>,
    vectors: Arc<dyn VectorIndex>,
    config: EngineConfig,
) -> MemoryEngine {
    MemoryEngine::new(
        config,
        records,
        vectors,
        Arc::new(StubEmbedder),
        Arc::new(InMemoryKvCache::new()),
    )
}

fn in_memory_engine() -> MemoryEngine {
    engine_with(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryVectorIndex::new()),
        EngineConfig::default(),
    )
}

fn new_memory(content: &str, project: &str) -> NewMemory {
    NewMemory {
        content: content.to_string(),
        project: Some(project.to_string()),
        memory_type: MemoryType::Conversation,
        session_id: None,
    }
}

fn hit(memory: &Memory, score: f32) -> VectorHit {
    VectorHit {
        memory_id: memory.id.clone(),
        content: memory.content.clone(),
        project: memory.project.clone(),
        memory_type: memory.memory_type,
        created_at: memory.created_at,
        score,
    }
}

#[tokio::test]
async fn unknown_project_gets_the_first_contact_marker() {
    let engine = in_memory_engine();
    let block = engine
        .generate_context("fresh-project", None, 10)
        .await
        .unwrap();

    assert_eq!(
        block.text,
        "<hindsight-context>\nNo prior context found for project: fresh-project\n\
         Memories will be saved as you work.\n</hindsight-context>"
    );
    assert!(block.degraded.is_empty());
    assert!(!block.cache_hit);
}

#[tokio::test]
async fn cached_context_replays_byte_identical() {
    let engine = in_memory_engine();
    engine
        .add_memory(new_memory("introduced retry budget for flaky tests", "api"))
        .await
        .unwrap();

    let first = engine.generate_context("api", None, 10).await.unwrap();
    let second = engine.generate_context("api", None, 10).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.text, second.text);
    assert!(first.text.contains("introduced retry budget"));

    let stats = engine.cache_stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[tokio::test]
async fn memory_write_shows_up_in_the_next_read() {
    let engine = in_memory_engine();

    // Prime the cache with the pre-write block.
    let before = engine.generate_context("api", None, 10).await.unwrap();
    assert!(before.text.contains("No prior context found"));

    engine
        .add_memory(new_memory("switched api to tower middleware", "api"))
        .await
        .unwrap();

    let after = engine.generate_context("api", None, 10).await.unwrap();
    assert!(!after.cache_hit);
    assert!(after.text.contains("switched api to tower middleware"));

    // And the new block is itself cached again.
    let replay = engine.generate_context("api", None, 10).await.unwrap();
    assert!(replay.cache_hit);
    assert_eq!(replay.text, after.text);
}

#[tokio::test]
async fn preference_write_invalidates_every_project() {
    let engine = in_memory_engine();
    engine
        .add_memory(new_memory("api work", "api"))
        .await
        .unwrap();
    engine
        .add_memory(new_memory("web work", "web"))
        .await
        .unwrap();
    engine.generate_context("api", None, 10).await.unwrap();
    engine.generate_context("web", None, 10).await.unwrap();

    engine
        .add_preference("always run the linter before committing", true)
        .await
        .unwrap();

    for project in ["api", "web"] {
        let block = engine.generate_context(project, None, 10).await.unwrap();
        assert!(!block.cache_hit, "stale block served for {project}");
        assert!(block.text.contains("## User Preferences"));
        assert!(block.text.contains("always run the linter"));
    }
}

#[tokio::test]
async fn search_ranks_semantic_relevance_above_recency() {
    let store = InMemoryRecordStore::new();
    let auth_fix = Memory::new(
        "Fixed auth bug in token refresh",
        Some("api".to_string()),
        MemoryType::Insight,
        None,
    );
    // Newer but far less relevant.
    let deps = Memory::new(
        "Updated deps and auth crate versions",
        Some("api".to_string()),
        MemoryType::Conversation,
        None,
    );
    store.save_memory(&auth_fix).await.unwrap();
    store.save_memory(&deps).await.unwrap();

    let vectors = ScriptedVectorIndex {
        hits: vec![hit(&auth_fix, 0.9), hit(&deps, 0.55)],
    };
    let engine = engine_with(Arc::new(store), Arc::new(vectors), EngineConfig::default());

    let outcome = engine
        .search_memories("auth", Some("api"), 10)
        .await
        .unwrap();
    assert!(outcome.degraded.is_empty());

    let ids: Vec<&str> = outcome
        .results
        .iter()
        .map(|r| r.memory_id.as_str())
        .collect();
    assert_eq!(ids, vec![auth_fix.id.as_str(), deps.id.as_str()]);
    assert_eq!(outcome.results[0].source, ResultSource::Semantic);
    assert!((outcome.results[0].score - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn sub_floor_semantic_hits_never_surface() {
    let store = InMemoryRecordStore::new();
    let weak = Memory::new(
        "barely related note",
        Some("api".to_string()),
        MemoryType::Conversation,
        None,
    );
    store.save_memory(&weak).await.unwrap();

    let vectors = ScriptedVectorIndex {
        hits: vec![hit(&weak, 0.4)],
    };
    let engine = engine_with(Arc::new(store), Arc::new(vectors), EngineConfig::default());

    let outcome = engine
        .search_memories("auth", Some("api"), 10)
        .await
        .unwrap();
    // The lexical side does not match "auth" and the semantic hit sits
    // below the 0.5 floor.
    assert!(outcome.results.is_empty());
    assert!(outcome.degraded.is_empty());
}

#[tokio::test]
async fn generate_context_stays_bounded_when_the_store_hangs() {
    let slow = SlowRecordStore {
        inner: InMemoryRecordStore::new(),
        delay: Duration::from_secs(2),
    };
    let config = EngineConfig::default().with_retrieval(
        RetrievalConfig::default()
            .with_query_timeout_ms(100)
            .with_overall_deadline_ms(300),
    );
    let engine = engine_with(
        Arc::new(slow),
        Arc::new(InMemoryVectorIndex::new()),
        config,
    );

    let started = std::time::Instant::now();
    let block = engine.generate_context("api", None, 10).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(block.degraded, vec![Backend::RecordStore]);

    // Degraded renders are never pinned; the next call tries again.
    let retry = engine.generate_context("api", None, 10).await.unwrap();
    assert!(!retry.cache_hit);
}

#[tokio::test]
async fn session_summary_feeds_the_next_context_block() {
    let engine = in_memory_engine();
    engine.begin_session("s42", "api").await.unwrap();
    engine.record_message("s42").await.unwrap();
    engine
        .end_session("s42", "api", Some("moved rate limiting into middleware"))
        .await
        .unwrap();

    let block = engine.generate_context("api", None, 10).await.unwrap();
    assert!(block.text.contains("## Project Activity: api"));
    assert!(
        block
            .text
            .contains("moved rate limiting into middleware")
    );
    assert!(block.text.contains("## Recent Context"));
    assert!(
        block
            .text
            .contains("[api] moved rate limiting into middleware")
    );
}

#[tokio::test]
async fn deleted_memory_disappears_from_context() {
    let engine = in_memory_engine();
    let stored = engine
        .add_memory(new_memory("temporary scratch note", "api"))
        .await
        .unwrap();
    let before = engine.generate_context("api", None, 10).await.unwrap();
    assert!(before.text.contains("temporary scratch note"));

    assert!(engine.delete_memory(&stored.memory.id).await.unwrap());

    let after = engine.generate_context("api", None, 10).await.unwrap();
    assert!(!after.cache_hit);
    assert!(!after.text.contains("temporary scratch note"));
}
