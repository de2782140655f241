//! Domain types shared across the engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durable fact extracted from an assistant conversation.
///
/// Embeddings are never part of this struct. They live in the vector
/// index, keyed by `id`, and a memory without one is still valid; it
/// just never surfaces through semantic ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    /// `None` marks a cross-project memory, eligible in every project scope.
    pub project: Option<String>,
    pub memory_type: MemoryType,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    pub fn new(
        content: impl Into<String>,
        project: Option<String>,
        memory_type: MemoryType,
        session_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            project,
            memory_type,
            session_id,
            created_at: Utc::now(),
        }
    }

    /// Project scoping rule: a filter of `None` accepts everything, a
    /// concrete filter accepts that project plus cross-project memories.
    pub fn matches_project(&self, filter: Option<&str>) -> bool {
        match filter {
            None => true,
            Some(p) => self.project.is_none() || self.project.as_deref() == Some(p),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Conversation,
    Preference,
    Pattern,
    Insight,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Preference => "preference",
            Self::Pattern => "pattern",
            Self::Insight => "insight",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation session record, owned by the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_path: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub token_count: u64,
    pub summary: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, project_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_path: project_path.into(),
            started_at: Utc::now(),
            ended_at: None,
            message_count: 0,
            token_count: 0,
            summary: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Short-lived session state held in the cache tier, separate from the
/// durable [`Session`] record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub project: String,
    pub started_at: DateTime<Utc>,
    pub message_count: u64,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            project: project.into(),
            started_at: Utc::now(),
            message_count: 0,
        }
    }
}

/// The user profile: long-lived standards plus a rolling window of
/// recent focus notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub static_prefs: Vec<String>,
    pub dynamic: Vec<String>,
}

impl Profile {
    pub fn is_empty(&self) -> bool {
        self.static_prefs.is_empty() && self.dynamic.is_empty()
    }
}

/// Which retrieval path produced a merged result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Semantic,
    Lexical,
}

/// One merged, scored retrieval hit. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub memory_id: String,
    pub content: String,
    /// Normalized relevance in `[0, 1]`.
    pub score: f64,
    pub source: ResultSource,
    pub memory_type: MemoryType,
    pub project: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One hit from the vector index, payload included.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub memory_id: String,
    pub content: String,
    pub project: Option<String>,
    pub memory_type: MemoryType,
    pub created_at: DateTime<Utc>,
    /// Cosine similarity in `[0, 1]`.
    pub score: f32,
}

/// A backend capability port, as named in degradation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    RecordStore,
    VectorIndex,
    Embedder,
    Cache,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordStore => "record_store",
            Self::VectorIndex => "vector_index",
            Self::Embedder => "embedder",
            Self::Cache => "cache",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merged, ranked output of one retrieval call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalOutcome {
    pub results: Vec<RankedResult>,
    /// Backends that failed or timed out during this call. Empty means
    /// every consulted backend answered.
    pub degraded: Vec<Backend>,
}

impl RetrievalOutcome {
    pub fn degraded_only(backends: impl IntoIterator<Item = Backend>) -> Self {
        Self {
            results: Vec::new(),
            degraded: backends.into_iter().collect(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// A rendered context block plus how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct ContextBlock {
    pub text: String,
    pub degraded: Vec<Backend>,
    pub cache_hit: bool,
}

/// Request payload for storing a new memory.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMemory {
    pub content: String,
    pub project: Option<String>,
    #[serde(default)]
    pub memory_type: MemoryType,
    pub session_id: Option<String>,
}

/// Outcome of a memory write: the stored record plus whether its
/// embedding made it into the vector index.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMemory {
    pub memory: Memory,
    pub indexed: bool,
}

/// Liveness of each port from one concurrent probe pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub record_store: bool,
    pub vector_index: bool,
    pub embedder: bool,
    pub cache: bool,
}

impl EngineStatus {
    pub fn all_healthy(&self) -> bool {
        self.record_store && self.vector_index && self.embedder && self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_assigns_uuid_and_timestamp() {
        let m = Memory::new("fixed auth bug", Some("api".into()), MemoryType::Insight, None);
        assert!(Uuid::parse_str(&m.id).is_ok());
        assert_eq!(m.project.as_deref(), Some("api"));
        assert!(m.created_at <= Utc::now());
    }

    #[test]
    fn project_scoping_includes_cross_project_memories() {
        let scoped = Memory::new("x", Some("api".into()), MemoryType::Conversation, None);
        let global = Memory::new("y", None, MemoryType::Preference, None);

        assert!(scoped.matches_project(Some("api")));
        assert!(!scoped.matches_project(Some("web")));
        assert!(global.matches_project(Some("api")));
        assert!(global.matches_project(Some("web")));
        assert!(scoped.matches_project(None));
    }

    #[test]
    fn memory_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MemoryType::Preference).unwrap(),
            "\"preference\""
        );
        let parsed: MemoryType = serde_json::from_str("\"insight\"").unwrap();
        assert_eq!(parsed, MemoryType::Insight);
    }

    #[test]
    fn backend_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Backend::VectorIndex).unwrap(),
            "\"vector_index\""
        );
        assert_eq!(Backend::RecordStore.to_string(), "record_store");
    }

    #[test]
    fn session_activity_follows_ended_at() {
        let mut s = Session::new("s1", "api");
        assert!(s.is_active());
        s.ended_at = Some(Utc::now());
        assert!(!s.is_active());
    }

    #[test]
    fn empty_outcome_with_flags_reports_degraded() {
        let outcome = RetrievalOutcome::degraded_only([Backend::VectorIndex, Backend::Embedder]);
        assert!(outcome.results.is_empty());
        assert!(outcome.is_degraded());
        assert!(!RetrievalOutcome::default().is_degraded());
    }
}
