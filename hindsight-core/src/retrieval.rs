//! Retrieval orchestration: concurrent sub-queries, merge, rank.
//!
//! A query fans out to the lexical path (record store full-text) and the
//! semantic path (embed, then vector search). Each backend stage gets
//! its own time budget and the whole call sits under a hard deadline.
//! Failures never propagate: a dead backend contributes no results and
//! one degradation flag, and the caller decides what partial output is
//! worth. An empty query skips the fan-out entirely and returns recent
//! activity from the durable store alone.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::error::{EngineError, Result};
use crate::models::{Backend, Memory, RankedResult, ResultSource, RetrievalOutcome, VectorHit};
use crate::ports::{Embedder, RecordStore, VectorIndex};

pub struct RetrievalOrchestrator {
    records: Arc<dyn RecordStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl RetrievalOrchestrator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            records,
            vectors,
            embedder,
            config,
        }
    }

    /// Run one retrieval call.
    ///
    /// `query` of `None` or blank selects recent-activity mode. A blank
    /// `project` or a zero `limit` is rejected before any backend call.
    pub async fn retrieve(
        &self,
        project: Option<&str>,
        query: Option<&str>,
        limit: usize,
    ) -> Result<RetrievalOutcome> {
        if limit == 0 {
            return Err(EngineError::invalid_input("limit must be at least 1"));
        }
        if let Some(p) = project
            && p.trim().is_empty()
        {
            return Err(EngineError::invalid_input("project must not be blank"));
        }
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        match query {
            None => self.recent(project, limit).await,
            Some(q) => self.search(project, q, limit).await,
        }
    }

    /// Recent-activity mode: newest durable memories, no semantic path.
    async fn recent(&self, project: Option<&str>, limit: usize) -> Result<RetrievalOutcome> {
        let budget = self.config.query_timeout();
        match timeout(budget, self.records.recent_memories(project, limit)).await {
            Ok(Ok(memories)) => {
                let results = memories
                    .into_iter()
                    .map(|m| self.lexical_result(m))
                    .collect();
                Ok(RetrievalOutcome {
                    results,
                    degraded: Vec::new(),
                })
            }
            Ok(Err(e)) => {
                warn!(error = %e, "recent-activity lookup failed");
                Ok(RetrievalOutcome::degraded_only([Backend::RecordStore]))
            }
            Err(_) => {
                warn!(budget_ms = budget.as_millis() as u64, "recent-activity lookup timed out");
                Ok(RetrievalOutcome::degraded_only([Backend::RecordStore]))
            }
        }
    }

    async fn search(
        &self,
        project: Option<&str>,
        query: &str,
        limit: usize,
    ) -> Result<RetrievalOutcome> {
        let deadline = Instant::now() + self.config.overall_deadline();
        let per_stage = self.config.query_timeout();

        let lexical = {
            let records = Arc::clone(&self.records);
            let query = query.to_string();
            let project = project.map(String::from);
            tokio::spawn(async move {
                run_stage(
                    per_stage,
                    Backend::RecordStore,
                    records.search_memories(&query, project.as_deref(), limit),
                )
                .await
            })
        };
        let semantic = {
            let embedder = Arc::clone(&self.embedder);
            let vectors = Arc::clone(&self.vectors);
            let query = query.to_string();
            let project = project.map(String::from);
            let min_score = self.config.min_semantic_score;
            tokio::spawn(async move {
                let embedding =
                    run_stage(per_stage, Backend::Embedder, embedder.embed(&query)).await?;
                run_stage(
                    per_stage,
                    Backend::VectorIndex,
                    vectors.search(&embedding, project.as_deref(), limit, min_score),
                )
                .await
            })
        };

        let mut degraded = Vec::new();
        let lexical_hits = match join_until(deadline, lexical, Backend::RecordStore).await {
            Ok(memories) => memories,
            Err(backend) => {
                degraded.push(backend);
                Vec::new()
            }
        };
        let semantic_hits = match join_until(deadline, semantic, Backend::VectorIndex).await {
            Ok(hits) => hits,
            Err(backend) => {
                degraded.push(backend);
                Vec::new()
            }
        };

        debug!(
            lexical = lexical_hits.len(),
            semantic = semantic_hits.len(),
            degraded = degraded.len(),
            "merging sub-query results"
        );
        let results = self.merge(lexical_hits, semantic_hits, limit);
        Ok(RetrievalOutcome { results, degraded })
    }

    /// Merge both sides, deduplicating by memory id. A memory surfaced
    /// by both paths keeps the semantic score and source.
    fn merge(
        &self,
        lexical: Vec<Memory>,
        semantic: Vec<VectorHit>,
        limit: usize,
    ) -> Vec<RankedResult> {
        let mut merged: HashMap<String, RankedResult> = HashMap::new();
        for memory in lexical {
            let result = self.lexical_result(memory);
            merged.insert(result.memory_id.clone(), result);
        }
        for hit in semantic {
            let result = semantic_result(hit);
            merged.insert(result.memory_id.clone(), result);
        }

        let mut results: Vec<RankedResult> = merged.into_values().collect();
        results.sort_by(rank_order);
        results.truncate(limit);
        results
    }

    fn lexical_result(&self, memory: Memory) -> RankedResult {
        RankedResult {
            memory_id: memory.id,
            content: memory.content,
            score: self.config.lexical_score,
            source: ResultSource::Lexical,
            memory_type: memory.memory_type,
            project: memory.project,
            created_at: memory.created_at,
        }
    }
}

fn semantic_result(hit: VectorHit) -> RankedResult {
    RankedResult {
        memory_id: hit.memory_id,
        content: hit.content,
        score: hit.score as f64,
        source: ResultSource::Semantic,
        memory_type: hit.memory_type,
        project: hit.project,
        created_at: hit.created_at,
    }
}

/// Ordering contract: score descending, then created_at descending,
/// then memory id ascending. Total, so repeated calls over the same
/// inputs produce the same sequence.
fn rank_order(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.memory_id.cmp(&b.memory_id))
}

/// Bound one backend stage. Failure and timeout both collapse to the
/// backend name; the distinction only matters in the logs.
async fn run_stage<T>(
    budget: Duration,
    backend: Backend,
    fut: impl Future<Output = Result<T>>,
) -> std::result::Result<T, Backend> {
    match timeout(budget, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(%backend, error = %e, "sub-query failed");
            Err(backend)
        }
        Err(_) => {
            warn!(%backend, budget_ms = budget.as_millis() as u64, "sub-query timed out");
            Err(backend)
        }
    }
}

/// Await a sub-task under the overall deadline. On expiry the task is
/// aborted and its eventual output discarded; sub-queries are reads, so
/// nothing is lost beyond the answer.
async fn join_until<T>(
    deadline: Instant,
    mut handle: JoinHandle<std::result::Result<T, Backend>>,
    backend: Backend,
) -> std::result::Result<T, Backend> {
    match timeout_at(deadline, &mut handle).await {
        Ok(Ok(inner)) => inner,
        Ok(Err(join_error)) => {
            warn!(%backend, error = %join_error, "sub-query task failed");
            Err(backend)
        }
        Err(_) => {
            handle.abort();
            warn!(%backend, "overall deadline expired, abandoning sub-query");
            Err(backend)
        }
    }
}
