//! The retrieval facade.
//!
//! One entry point over the orchestrator, cache tier, profile and
//! formatter. Callers hold a [`MemoryEngine`] and four trait objects
//! behind it; nothing above this module touches a backend directly.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{CacheStats, ComputedContext, ContextCache};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::formatter::ContextFormatter;
use crate::models::{
    Backend, ContextBlock, EngineStatus, Memory, MemoryType, NewMemory, Profile, RetrievalOutcome,
    Session, StoredMemory,
};
use crate::ports::{Embedder, KvCache, RecordStore, VectorIndex};
use crate::profile::ProfileManager;
use crate::retrieval::RetrievalOrchestrator;

pub struct MemoryEngine {
    records: Arc<dyn RecordStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    kv: Arc<dyn KvCache>,
    orchestrator: RetrievalOrchestrator,
    cache: ContextCache,
    profile: ProfileManager,
    config: EngineConfig,
}

impl MemoryEngine {
    pub fn new(
        config: EngineConfig,
        records: Arc<dyn RecordStore>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        kv: Arc<dyn KvCache>,
    ) -> Self {
        let orchestrator = RetrievalOrchestrator::new(
            Arc::clone(&records),
            Arc::clone(&vectors),
            Arc::clone(&embedder),
            config.retrieval.clone(),
        );
        let cache = ContextCache::new(Arc::clone(&kv), &config);
        let profile = ProfileManager::new(Arc::clone(&kv), &config);
        Self {
            records,
            vectors,
            embedder,
            kv,
            orchestrator,
            cache,
            profile,
            config,
        }
    }

    /// Produce the context block for a session start.
    ///
    /// Served from the cache tier when possible; otherwise recent
    /// activity and the profile are fetched, rendered and stored. Always
    /// succeeds for valid input, however many backends are down.
    pub async fn generate_context(
        &self,
        project: &str,
        session_id: Option<&str>,
        max_items: usize,
    ) -> Result<ContextBlock> {
        let project = validated_project(project)?;
        if max_items == 0 {
            return Err(EngineError::invalid_input("max_items must be at least 1"));
        }
        if let Some(sid) = session_id
            && !sid.trim().is_empty()
        {
            // Best effort; a dead cache must not block context generation.
            if let Err(e) = self.cache.touch_session(sid, project).await {
                warn!(session_id = sid, error = %e, "session state refresh failed");
            }
        }
        self.cache
            .get_or_compute(project, || self.render(project, max_items))
            .await
    }

    /// The miss path: recent activity plus profile, rendered.
    async fn render(&self, project: &str, max_items: usize) -> Result<ComputedContext> {
        let outcome = self
            .orchestrator
            .retrieve(Some(project), None, max_items)
            .await?;
        let mut degraded = outcome.degraded;

        let profile = match self.profile.get_profile().await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "profile read failed, rendering without it");
                if !degraded.contains(&Backend::Cache) {
                    degraded.push(Backend::Cache);
                }
                Profile::default()
            }
        };

        let text = ContextFormatter::format(
            &profile,
            &outcome.results,
            project,
            self.config.retrieval.max_item_chars,
        );
        Ok(ComputedContext { text, degraded })
    }

    /// Ranked search across both retrieval paths.
    pub async fn search_memories(
        &self,
        query: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<RetrievalOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::invalid_input("query must not be empty"));
        }
        self.orchestrator.retrieve(project, Some(query), limit).await
    }

    /// Store a memory durably, index it best-effort, and invalidate the
    /// affected context entries before returning.
    pub async fn add_memory(&self, new: NewMemory) -> Result<StoredMemory> {
        let content = new.content.trim();
        if content.is_empty() {
            return Err(EngineError::invalid_input("memory content must not be empty"));
        }
        let project = new
            .project
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from);
        let memory = Memory::new(content, project, new.memory_type, new.session_id);

        self.records.save_memory(&memory).await?;
        let indexed = self.index_memory(&memory).await;
        self.invalidate_for(memory.project.as_deref()).await;
        info!(memory_id = %memory.id, indexed, "memory stored");
        Ok(StoredMemory { memory, indexed })
    }

    /// Embed and upsert into the vector index. A failure here leaves the
    /// memory durable but absent from semantic ranking, which matches
    /// the tolerated-inconsistency contract.
    async fn index_memory(&self, memory: &Memory) -> bool {
        let budget = self.config.retrieval.query_timeout();
        let embedding = match tokio::time::timeout(budget, self.embedder.embed(&memory.content))
            .await
        {
            Ok(Ok(embedding)) => embedding,
            Ok(Err(e)) => {
                warn!(memory_id = %memory.id, error = %e, "embedding failed, stored without vector");
                return false;
            }
            Err(_) => {
                warn!(memory_id = %memory.id, "embedding timed out, stored without vector");
                return false;
            }
        };
        match tokio::time::timeout(budget, self.vectors.upsert(memory, &embedding)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(memory_id = %memory.id, error = %e, "vector upsert failed");
                false
            }
            Err(_) => {
                warn!(memory_id = %memory.id, "vector upsert timed out");
                false
            }
        }
    }

    /// Delete a memory from both stores. `Ok(false)` when the id was
    /// unknown to the record store.
    pub async fn delete_memory(&self, id: &str) -> Result<bool> {
        if id.trim().is_empty() {
            return Err(EngineError::invalid_input("memory id must not be empty"));
        }
        let existing = self.records.get_memory(id).await?;
        let deleted = self.records.delete_memory(id).await?;
        if let Err(e) = self.vectors.remove(id).await {
            warn!(memory_id = id, error = %e, "vector removal failed");
        }
        if deleted {
            self.invalidate_for(existing.as_ref().and_then(|m| m.project.as_deref()))
                .await;
            info!(memory_id = id, "memory deleted");
        }
        Ok(deleted)
    }

    /// Record a profile entry. The profile reaches every project's
    /// block, so all context entries are invalidated.
    pub async fn add_preference(&self, text: &str, static_pref: bool) -> Result<()> {
        self.profile.add_preference(text, static_pref).await?;
        if let Err(e) = self.cache.invalidate_all().await {
            warn!(error = %e, "context invalidation failed after preference write");
        }
        info!(static_pref, "preference recorded");
        Ok(())
    }

    pub async fn get_profile(&self) -> Result<Profile> {
        self.profile.get_profile().await
    }

    /// Open session bookkeeping. Backend failures are logged, not
    /// returned; a session must start even with every store down.
    pub async fn begin_session(&self, session_id: &str, project_path: &str) -> Result<()> {
        let session_id = validated_id(session_id, "session id")?;
        let project_path = validated_project(project_path)?;

        let session = Session::new(session_id, project_path);
        if let Err(e) = self.records.record_session(&session).await {
            warn!(session_id, error = %e, "durable session record failed");
        }
        if let Err(e) = self.cache.mark_session_active(session_id, project_path).await {
            warn!(session_id, error = %e, "session state write failed");
        }
        info!(session_id, project = project_path, "session started");
        Ok(())
    }

    /// Close a session. A summary, when present, becomes a durable
    /// memory plus a dynamic profile note before the session record is
    /// closed out.
    pub async fn end_session(
        &self,
        session_id: &str,
        project: &str,
        summary: Option<&str>,
    ) -> Result<()> {
        let session_id = validated_id(session_id, "session id")?;
        let project = validated_project(project)?;
        let summary = summary.map(str::trim).filter(|s| !s.is_empty());

        let mut profile_touched = false;
        if let Some(text) = summary {
            let stored = self
                .add_memory(NewMemory {
                    content: text.to_string(),
                    project: Some(project.to_string()),
                    memory_type: MemoryType::Conversation,
                    session_id: Some(session_id.to_string()),
                })
                .await;
            match stored {
                Ok(_) => {
                    let brief: String = text.chars().take(100).collect();
                    let note = format!("[{project}] {brief}");
                    match self.profile.add_preference(&note, false).await {
                        Ok(()) => profile_touched = true,
                        Err(e) => warn!(session_id, error = %e, "dynamic context note failed"),
                    }
                }
                Err(e) => warn!(session_id, error = %e, "summary memory save failed"),
            }
        }

        if let Err(e) = self.records.close_session(session_id, summary).await {
            warn!(session_id, error = %e, "durable session close failed");
        }
        if let Err(e) = self.cache.end_session(session_id).await {
            warn!(session_id, error = %e, "session state removal failed");
        }

        if profile_touched {
            if let Err(e) = self.cache.invalidate_all().await {
                warn!(error = %e, "context invalidation failed after session close");
            }
        } else {
            self.invalidate_for(Some(project)).await;
        }
        info!(session_id, project, "session ended");
        Ok(())
    }

    pub async fn list_sessions(&self, project: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        if limit == 0 {
            return Err(EngineError::invalid_input("limit must be at least 1"));
        }
        self.records.recent_sessions(project, limit).await
    }

    /// Bump the active session's message counter.
    pub async fn record_message(&self, session_id: &str) -> Result<u64> {
        let session_id = validated_id(session_id, "session id")?;
        self.cache.record_message(session_id).await
    }

    /// Probe all four ports concurrently.
    pub async fn status(&self) -> EngineStatus {
        let (record_store, vector_index, embedder, cache) = futures::join!(
            self.records.is_healthy(),
            self.vectors.is_healthy(),
            self.embedder.is_healthy(),
            self.kv.is_healthy(),
        );
        EngineStatus {
            record_store,
            vector_index,
            embedder,
            cache,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn invalidate_for(&self, project: Option<&str>) {
        // A cross-project write can stale any project's block.
        let result = match project {
            Some(p) => self.cache.invalidate(p).await.map(|_| ()),
            None => self.cache.invalidate_all().await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!(error = %e, "context invalidation failed");
        }
    }
}

fn validated_project(project: &str) -> Result<&str> {
    let trimmed = project.trim();
    if trimmed.is_empty() {
        return Err(EngineError::invalid_input("project must not be empty"));
    }
    Ok(trimmed)
}

fn validated_id<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::invalid_input(format!("{what} must not be empty")));
    }
    Ok(trimmed)
}
