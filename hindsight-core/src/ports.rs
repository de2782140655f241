//! Backend capability ports.
//!
//! The engine depends on these four contracts, never on a concrete
//! backend type. Each port reports its own liveness, and the engine
//! treats the four independently: a dead vector index leaves lexical
//! retrieval fully usable, and vice versa.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Memory, Session, VectorHit};

/// Durable store for memory records and session bookkeeping.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new memory. Write failures propagate to the caller.
    async fn save_memory(&self, memory: &Memory) -> Result<()>;

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>>;

    /// Delete a memory. `Ok(false)` when the id was unknown.
    async fn delete_memory(&self, id: &str) -> Result<bool>;

    /// Most recent memories in scope, newest first.
    async fn recent_memories(&self, project: Option<&str>, limit: usize) -> Result<Vec<Memory>>;

    /// Lexical full-text match, best hits first.
    async fn search_memories(
        &self,
        query: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>>;

    async fn record_session(&self, session: &Session) -> Result<()>;

    /// Mark a session ended. Unknown ids are a no-op.
    async fn close_session(&self, session_id: &str, summary: Option<&str>) -> Result<()>;

    /// Most recently started sessions, newest first.
    async fn recent_sessions(&self, project: Option<&str>, limit: usize) -> Result<Vec<Session>>;

    async fn is_healthy(&self) -> bool;
}

/// Vector-similarity index keyed by memory id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest matches above `min_score`, highest similarity first.
    async fn search(
        &self,
        embedding: &[f32],
        project: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>>;

    async fn upsert(&self, memory: &Memory, embedding: &[f32]) -> Result<()>;

    /// Remove a point. Unknown ids are a no-op.
    async fn remove(&self, id: &str) -> Result<()>;

    async fn is_healthy(&self) -> bool;
}

/// Text-to-vector service.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of produced vectors.
    fn dimension(&self) -> usize;

    async fn is_healthy(&self) -> bool;
}

/// Key-value cache with per-key TTL. Substrate for the cache tier and
/// the profile store.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value. `ttl` of `None` stores without expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Delete a key. `Ok(false)` when it was absent.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every key under a prefix, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    async fn is_healthy(&self) -> bool;
}
