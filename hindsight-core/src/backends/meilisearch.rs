//! Meilisearch-backed durable record store.
//!
//! Memories and sessions live in two indexes. Typo-tolerant full-text
//! search over `content` is the lexical retrieval path; `created_at` is
//! stored as epoch seconds so recent-activity queries can sort on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meilisearch_sdk::client::Client;
use meilisearch_sdk::errors::{Error as MeiliError, ErrorCode};
use meilisearch_sdk::settings::Settings;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MeilisearchConfig;
use crate::error::{EngineError, Result};
use crate::models::{Backend, Memory, MemoryType, Session};
use crate::ports::RecordStore;

#[derive(Debug, Serialize, Deserialize)]
struct MemoryDocument {
    id: String,
    content: String,
    project: Option<String>,
    memory_type: MemoryType,
    session_id: Option<String>,
    created_at: i64,
}

impl From<&Memory> for MemoryDocument {
    fn from(memory: &Memory) -> Self {
        Self {
            id: memory.id.clone(),
            content: memory.content.clone(),
            project: memory.project.clone(),
            memory_type: memory.memory_type,
            session_id: memory.session_id.clone(),
            created_at: memory.created_at.timestamp(),
        }
    }
}

impl MemoryDocument {
    fn into_memory(self) -> Memory {
        Memory {
            id: self.id,
            content: self.content,
            project: self.project,
            memory_type: self.memory_type,
            session_id: self.session_id,
            created_at: DateTime::from_timestamp(self.created_at, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    id: String,
    project_path: String,
    started_at: i64,
    ended_at: Option<i64>,
    message_count: u64,
    token_count: u64,
    summary: Option<String>,
}

impl From<&Session> for SessionDocument {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            project_path: session.project_path.clone(),
            started_at: session.started_at.timestamp(),
            ended_at: session.ended_at.map(|t| t.timestamp()),
            message_count: session.message_count,
            token_count: session.token_count,
            summary: session.summary.clone(),
        }
    }
}

impl SessionDocument {
    fn into_session(self) -> Session {
        Session {
            id: self.id,
            project_path: self.project_path,
            started_at: DateTime::from_timestamp(self.started_at, 0).unwrap_or_default(),
            ended_at: self
                .ended_at
                .and_then(|t| DateTime::from_timestamp(t, 0)),
            message_count: self.message_count,
            token_count: self.token_count,
            summary: self.summary,
        }
    }
}

pub struct MeilisearchStore {
    client: Client,
    memories_index: String,
    sessions_index: String,
}

impl MeilisearchStore {
    pub fn new(config: &MeilisearchConfig) -> Result<Self> {
        let client = Client::new(&config.url, config.api_key.as_deref())
            .map_err(|e| EngineError::Config(format!("meilisearch client: {e}")))?;
        Ok(Self {
            client,
            memories_index: config.memories_index.clone(),
            sessions_index: config.sessions_index.clone(),
        })
    }

    /// Creates both indexes and applies attribute settings. Idempotent,
    /// meant to run once at startup.
    pub async fn init_indexes(&self) -> Result<()> {
        // Already-exists errors are fine here.
        let _ = self
            .client
            .create_index(&self.memories_index, Some("id"))
            .await;
        let _ = self
            .client
            .create_index(&self.sessions_index, Some("id"))
            .await;

        let memory_settings = Settings::new()
            .with_searchable_attributes(["content"])
            .with_filterable_attributes(["project", "memory_type", "session_id", "created_at"])
            .with_sortable_attributes(["created_at"]);
        self.client
            .index(&self.memories_index)
            .set_settings(&memory_settings)
            .await
            .map_err(|e| EngineError::backend(Backend::RecordStore, e))?;

        let session_settings = Settings::new()
            .with_searchable_attributes(["summary", "project_path"])
            .with_filterable_attributes(["project_path", "ended_at"])
            .with_sortable_attributes(["started_at"]);
        self.client
            .index(&self.sessions_index)
            .set_settings(&session_settings)
            .await
            .map_err(|e| EngineError::backend(Backend::RecordStore, e))?;

        debug!(
            memories = %self.memories_index,
            sessions = %self.sessions_index,
            "meilisearch indexes ready"
        );
        Ok(())
    }

    fn memory_filter(project: Option<&str>) -> Option<String> {
        project.map(|p| format!("project = \"{p}\" OR project IS NULL"))
    }
}

#[async_trait]
impl RecordStore for MeilisearchStore {
    async fn save_memory(&self, memory: &Memory) -> Result<()> {
        self.client
            .index(&self.memories_index)
            .add_documents(&[MemoryDocument::from(memory)], Some("id"))
            .await
            .map_err(|e| EngineError::backend(Backend::RecordStore, e))?;
        Ok(())
    }

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        match self
            .client
            .index(&self.memories_index)
            .get_document::<MemoryDocument>(id)
            .await
        {
            Ok(doc) => Ok(Some(doc.into_memory())),
            Err(MeiliError::Meilisearch(ref e))
                if matches!(e.error_code, ErrorCode::DocumentNotFound) =>
            {
                Ok(None)
            }
            Err(e) => Err(EngineError::backend(Backend::RecordStore, e)),
        }
    }

    async fn delete_memory(&self, id: &str) -> Result<bool> {
        if self.get_memory(id).await?.is_none() {
            return Ok(false);
        }
        self.client
            .index(&self.memories_index)
            .delete_document(id)
            .await
            .map_err(|e| EngineError::backend(Backend::RecordStore, e))?;
        Ok(true)
    }

    async fn recent_memories(&self, project: Option<&str>, limit: usize) -> Result<Vec<Memory>> {
        let index = self.client.index(&self.memories_index);
        let filter = Self::memory_filter(project);
        let sort = ["created_at:desc"];

        let mut search = index.search();
        search.with_query("").with_limit(limit).with_sort(&sort);
        if let Some(f) = filter.as_deref() {
            search.with_filter(f);
        }
        let results = search
            .execute::<MemoryDocument>()
            .await
            .map_err(|e| EngineError::backend(Backend::RecordStore, e))?;
        Ok(results
            .hits
            .into_iter()
            .map(|hit| hit.result.into_memory())
            .collect())
    }

    async fn search_memories(
        &self,
        query: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let index = self.client.index(&self.memories_index);
        let filter = Self::memory_filter(project);

        let mut search = index.search();
        search.with_query(query).with_limit(limit);
        if let Some(f) = filter.as_deref() {
            search.with_filter(f);
        }
        let results = search
            .execute::<MemoryDocument>()
            .await
            .map_err(|e| EngineError::backend(Backend::RecordStore, e))?;
        Ok(results
            .hits
            .into_iter()
            .map(|hit| hit.result.into_memory())
            .collect())
    }

    async fn record_session(&self, session: &Session) -> Result<()> {
        self.client
            .index(&self.sessions_index)
            .add_documents(&[SessionDocument::from(session)], Some("id"))
            .await
            .map_err(|e| EngineError::backend(Backend::RecordStore, e))?;
        Ok(())
    }

    async fn close_session(&self, session_id: &str, summary: Option<&str>) -> Result<()> {
        let index = self.client.index(&self.sessions_index);
        let mut doc = match index.get_document::<SessionDocument>(session_id).await {
            Ok(doc) => doc,
            Err(MeiliError::Meilisearch(ref e))
                if matches!(e.error_code, ErrorCode::DocumentNotFound) =>
            {
                return Ok(());
            }
            Err(e) => return Err(EngineError::backend(Backend::RecordStore, e)),
        };
        doc.ended_at = Some(Utc::now().timestamp());
        if summary.is_some() {
            doc.summary = summary.map(String::from);
        }
        index
            .add_documents(&[doc], Some("id"))
            .await
            .map_err(|e| EngineError::backend(Backend::RecordStore, e))?;
        Ok(())
    }

    async fn recent_sessions(&self, project: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        let index = self.client.index(&self.sessions_index);
        let filter = project.map(|p| format!("project_path = \"{p}\""));
        let sort = ["started_at:desc"];

        let mut search = index.search();
        search.with_query("").with_limit(limit).with_sort(&sort);
        if let Some(f) = filter.as_deref() {
            search.with_filter(f);
        }
        let results = search
            .execute::<SessionDocument>()
            .await
            .map_err(|e| EngineError::backend(Backend::RecordStore, e))?;
        Ok(results
            .hits
            .into_iter()
            .map(|hit| hit.result.into_session())
            .collect())
    }

    async fn is_healthy(&self) -> bool {
        self.client.health().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_roundtrip_preserves_fields() {
        let memory = Memory::new(
            "prefers rebase over merge",
            Some("api".into()),
            MemoryType::Preference,
            Some("s1".into()),
        );
        let restored = MemoryDocument::from(&memory).into_memory();
        assert_eq!(restored.id, memory.id);
        assert_eq!(restored.content, memory.content);
        assert_eq!(restored.project, memory.project);
        assert_eq!(restored.memory_type, memory.memory_type);
        // Sub-second precision is dropped by the epoch encoding.
        assert_eq!(
            restored.created_at.timestamp(),
            memory.created_at.timestamp()
        );
    }

    #[test]
    fn scoped_filter_admits_cross_project_documents() {
        assert_eq!(
            MeilisearchStore::memory_filter(Some("api")).as_deref(),
            Some("project = \"api\" OR project IS NULL")
        );
        assert_eq!(MeilisearchStore::memory_filter(None), None);
    }

    // Requires a running Meilisearch at MEILISEARCH_URL (default
    // http://localhost:7700). Run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn live_save_and_search_roundtrip() {
        let store = MeilisearchStore::new(&MeilisearchConfig::default()).unwrap();
        store.init_indexes().await.unwrap();

        let memory = Memory::new(
            "live roundtrip memory about websocket reconnects",
            Some("live-test".into()),
            MemoryType::Insight,
            None,
        );
        store.save_memory(&memory).await.unwrap();
        // Meilisearch indexes asynchronously.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        let found = store.get_memory(&memory.id).await.unwrap();
        assert_eq!(found.map(|m| m.id), Some(memory.id.clone()));

        let hits = store
            .search_memories("websocket", Some("live-test"), 5)
            .await
            .unwrap();
        assert!(hits.iter().any(|m| m.id == memory.id));

        assert!(store.delete_memory(&memory.id).await.unwrap());
    }
}
