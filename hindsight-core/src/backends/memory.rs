//! In-memory backend implementations.
//!
//! Used for development without external services and as deterministic
//! fixtures in tests. They honor the same contracts as the networked
//! adapters, including TTL expiry and project scoping.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{Memory, Session, VectorHit};
use crate::ports::{KvCache, RecordStore, VectorIndex};

/// Key-value cache backed by a [`DashMap`], with expiry checked on read.
#[derive(Default)]
pub struct InMemoryKvCache {
    entries: DashMap<String, KvEntry>,
}

struct KvEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

impl InMemoryKvCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvCache for InMemoryKvCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Missing or lazily expired; removal of an absent key is harmless.
        self.entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = KvEntry {
            value: value.to_string(),
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()))
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Record store backed by hash maps behind an async lock.
#[derive(Default)]
pub struct InMemoryRecordStore {
    memories: RwLock<HashMap<String, Memory>>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn memory_count(&self) -> usize {
        self.memories.read().await.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save_memory(&self, memory: &Memory) -> Result<()> {
        self.memories
            .write()
            .await
            .insert(memory.id.clone(), memory.clone());
        Ok(())
    }

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        Ok(self.memories.read().await.get(id).cloned())
    }

    async fn delete_memory(&self, id: &str) -> Result<bool> {
        Ok(self.memories.write().await.remove(id).is_some())
    }

    async fn recent_memories(&self, project: Option<&str>, limit: usize) -> Result<Vec<Memory>> {
        let store = self.memories.read().await;
        let mut matching: Vec<Memory> = store
            .values()
            .filter(|m| m.matches_project(project))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn search_memories(
        &self,
        query: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();
        let store = self.memories.read().await;
        let mut matching: Vec<Memory> = store
            .values()
            .filter(|m| m.matches_project(project))
            .filter(|m| {
                let content = m.content.to_lowercase();
                terms.iter().all(|t| content.contains(t))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn record_session(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn close_session(&self, session_id: &str, summary: Option<&str>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.ended_at = Some(chrono::Utc::now());
            if summary.is_some() {
                session.summary = summary.map(String::from);
            }
        }
        Ok(())
    }

    async fn recent_sessions(&self, project: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut matching: Vec<Session> = sessions
            .values()
            .filter(|s| match project {
                None => true,
                Some(p) => s.project_path.contains(p),
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Vector index computing exact cosine similarity over stored points.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    points: RwLock<HashMap<String, IndexedPoint>>,
}

struct IndexedPoint {
    memory: Memory,
    embedding: Vec<f32>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn point_count(&self) -> usize {
        self.points.read().await.len()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        embedding: &[f32],
        project: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>> {
        let points = self.points.read().await;
        let mut hits: Vec<VectorHit> = points
            .values()
            .filter(|p| p.memory.matches_project(project))
            .filter_map(|p| {
                let score = cosine_similarity(embedding, &p.embedding);
                (score >= min_score).then(|| VectorHit {
                    memory_id: p.memory.id.clone(),
                    content: p.memory.content.clone(),
                    project: p.memory.project.clone(),
                    memory_type: p.memory.memory_type,
                    created_at: p.memory.created_at,
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.memory_id.cmp(&b.memory_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(&self, memory: &Memory, embedding: &[f32]) -> Result<()> {
        let point = IndexedPoint {
            memory: memory.clone(),
            embedding: embedding.to_vec(),
        };
        self.points.write().await.insert(memory.id.clone(), point);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.points.write().await.remove(id);
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
