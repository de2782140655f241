//! Cache tier: rendered context blocks and session-active state.
//!
//! The context namespace is a cache-aside layer over the full render
//! path. Entries expire after 4 hours or on explicit invalidation,
//! whichever comes first, and every writer invalidates synchronously so
//! a read issued after a write never sees the pre-write block. Degraded
//! renders are served but never stored; the next call retries the
//! backends instead of pinning a partial block for the TTL window.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{Backend, ContextBlock, SessionState};
use crate::ports::KvCache;

/// What the miss-path closure hands back to the cache.
#[derive(Debug, Clone)]
pub struct ComputedContext {
    pub text: String,
    pub degraded: Vec<Backend>,
}

/// Counter snapshot served by the stats surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

pub struct ContextCache {
    kv: Arc<dyn KvCache>,
    context_prefix: String,
    session_prefix: String,
    context_ttl: Duration,
    session_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl ContextCache {
    pub fn new(kv: Arc<dyn KvCache>, config: &EngineConfig) -> Self {
        let prefix = config.key_prefix.as_str();
        Self {
            kv,
            context_prefix: format!("{prefix}:context:"),
            session_prefix: format!("{prefix}:session:"),
            context_ttl: config.ttl.context_ttl(),
            session_ttl: config.ttl.session_ttl(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn with_context_ttl(mut self, ttl: Duration) -> Self {
        self.context_ttl = ttl;
        self
    }

    fn context_key(&self, project: &str) -> String {
        format!("{}{}", self.context_prefix, project)
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}{}", self.session_prefix, session_id)
    }

    /// Cache-aside read of a project's context block.
    ///
    /// A hit returns the stored bytes unchanged. On a miss the closure
    /// runs the full render path; its output is stored only when no
    /// backend degraded. A failing cache never blocks the read, it just
    /// turns every call into a compute and flags itself.
    pub async fn get_or_compute<F, Fut>(&self, project: &str, compute: F) -> Result<ContextBlock>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ComputedContext>>,
    {
        let key = self.context_key(project);
        let mut cache_degraded = false;
        match self.kv.get(&key).await {
            Ok(Some(text)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(project, "context cache hit");
                return Ok(ContextBlock {
                    text,
                    degraded: Vec::new(),
                    cache_hit: true,
                });
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(project, error = %e, "context cache read failed");
                cache_degraded = true;
            }
        }

        let computed = compute().await?;
        let mut degraded = computed.degraded;
        if cache_degraded {
            if !degraded.contains(&Backend::Cache) {
                degraded.push(Backend::Cache);
            }
        } else if degraded.is_empty() {
            if let Err(e) = self
                .kv
                .set(&key, &computed.text, Some(self.context_ttl))
                .await
            {
                warn!(project, error = %e, "context cache write failed");
                degraded.push(Backend::Cache);
            }
        }
        Ok(ContextBlock {
            text: computed.text,
            degraded,
            cache_hit: false,
        })
    }

    /// Drop one project's block. Writers call this before returning.
    pub async fn invalidate(&self, project: &str) -> Result<bool> {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        let removed = self.kv.delete(&self.context_key(project)).await?;
        debug!(project, removed, "context entry invalidated");
        Ok(removed)
    }

    /// Drop every project's block, for writes with global reach such as
    /// profile updates.
    pub async fn invalidate_all(&self) -> Result<usize> {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        let removed = self.kv.delete_prefix(&self.context_prefix).await?;
        debug!(removed, "all context entries invalidated");
        Ok(removed)
    }

    /// Record a session as active, overwriting any previous state.
    pub async fn mark_session_active(&self, session_id: &str, project: &str) -> Result<()> {
        let state = SessionState::new(session_id, project);
        self.kv
            .set(
                &self.session_key(session_id),
                &serde_json::to_string(&state)?,
                Some(self.session_ttl),
            )
            .await
    }

    /// Refresh a session's idle clock, creating state if none exists.
    /// Unlike [`mark_session_active`](Self::mark_session_active) this
    /// preserves an existing message count.
    pub async fn touch_session(&self, session_id: &str, project: &str) -> Result<()> {
        let key = self.session_key(session_id);
        match self.kv.get(&key).await? {
            Some(raw) => self.kv.set(&key, &raw, Some(self.session_ttl)).await,
            None => self.mark_session_active(session_id, project).await,
        }
    }

    pub async fn active_session(&self, session_id: &str) -> Result<Option<SessionState>> {
        match self.kv.get(&self.session_key(session_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Bump a session's message counter, returning the new count.
    /// Counts 0 for unknown sessions rather than erroring; activity
    /// tracking must never break a tool call.
    pub async fn record_message(&self, session_id: &str) -> Result<u64> {
        let key = self.session_key(session_id);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(0);
        };
        let mut state: SessionState = serde_json::from_str(&raw)?;
        state.message_count += 1;
        self.kv
            .set(&key, &serde_json::to_string(&state)?, Some(self.session_ttl))
            .await?;
        Ok(state.message_count)
    }

    /// Remove a session's active state.
    pub async fn end_session(&self, session_id: &str) -> Result<bool> {
        self.kv.delete(&self.session_key(session_id)).await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::InMemoryKvCache;
    use crate::error::EngineError;
    use async_trait::async_trait;

    struct BrokenKv;

    #[async_trait]
    impl KvCache for BrokenKv {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(EngineError::backend(Backend::Cache, "connection refused"))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
            Err(EngineError::backend(Backend::Cache, "connection refused"))
        }

        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(EngineError::backend(Backend::Cache, "connection refused"))
        }

        async fn delete_prefix(&self, _prefix: &str) -> Result<usize> {
            Err(EngineError::backend(Backend::Cache, "connection refused"))
        }

        async fn is_healthy(&self) -> bool {
            false
        }
    }

    fn cache() -> ContextCache {
        ContextCache::new(Arc::new(InMemoryKvCache::new()), &EngineConfig::default())
    }

    fn healthy(text: &str) -> ComputedContext {
        ComputedContext {
            text: text.to_string(),
            degraded: Vec::new(),
        }
    }

    #[tokio::test]
    async fn second_read_hits_with_identical_bytes() {
        let cache = cache();
        let first = cache
            .get_or_compute("api", || async { Ok(healthy("block one")) })
            .await
            .unwrap();
        assert!(!first.cache_hit);

        let second = cache
            .get_or_compute("api", || async { Ok(healthy("different render")) })
            .await
            .unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.text, first.text);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let cache = cache();
        cache
            .get_or_compute("api", || async { Ok(healthy("v1")) })
            .await
            .unwrap();
        assert!(cache.invalidate("api").await.unwrap());

        let after = cache
            .get_or_compute("api", || async { Ok(healthy("v2")) })
            .await
            .unwrap();
        assert!(!after.cache_hit);
        assert_eq!(after.text, "v2");
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_project() {
        let cache = cache();
        cache
            .get_or_compute("api", || async { Ok(healthy("a")) })
            .await
            .unwrap();
        cache
            .get_or_compute("web", || async { Ok(healthy("b")) })
            .await
            .unwrap();
        assert_eq!(cache.invalidate_all().await.unwrap(), 2);

        let after = cache
            .get_or_compute("api", || async { Ok(healthy("a2")) })
            .await
            .unwrap();
        assert!(!after.cache_hit);
    }

    #[tokio::test]
    async fn degraded_render_is_served_but_not_stored() {
        let cache = cache();
        let degraded = cache
            .get_or_compute("api", || async {
                Ok(ComputedContext {
                    text: "partial".to_string(),
                    degraded: vec![Backend::VectorIndex],
                })
            })
            .await
            .unwrap();
        assert_eq!(degraded.degraded, vec![Backend::VectorIndex]);

        // The degraded block was not pinned; the next call recomputes.
        let next = cache
            .get_or_compute("api", || async { Ok(healthy("full")) })
            .await
            .unwrap();
        assert!(!next.cache_hit);
        assert_eq!(next.text, "full");
    }

    #[tokio::test]
    async fn entries_expire_after_context_ttl() {
        let cache = cache().with_context_ttl(Duration::from_millis(20));
        cache
            .get_or_compute("api", || async { Ok(healthy("short lived")) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let after = cache
            .get_or_compute("api", || async { Ok(healthy("fresh")) })
            .await
            .unwrap();
        assert!(!after.cache_hit);
        assert_eq!(after.text, "fresh");
    }

    #[tokio::test]
    async fn broken_cache_degrades_instead_of_failing() {
        let cache = ContextCache::new(Arc::new(BrokenKv), &EngineConfig::default());
        let block = cache
            .get_or_compute("api", || async { Ok(healthy("computed anyway")) })
            .await
            .unwrap();
        assert!(!block.cache_hit);
        assert_eq!(block.text, "computed anyway");
        assert_eq!(block.degraded, vec![Backend::Cache]);
    }

    #[tokio::test]
    async fn compute_errors_propagate() {
        let cache = cache();
        let err = cache
            .get_or_compute("api", || async {
                Err(EngineError::invalid_input("bad project"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn session_lifecycle_tracks_messages() {
        let cache = cache();
        cache.mark_session_active("s1", "api").await.unwrap();

        let state = cache.active_session("s1").await.unwrap().unwrap();
        assert_eq!(state.project, "api");
        assert_eq!(state.message_count, 0);

        assert_eq!(cache.record_message("s1").await.unwrap(), 1);
        assert_eq!(cache.record_message("s1").await.unwrap(), 2);
        assert_eq!(cache.record_message("unknown").await.unwrap(), 0);

        assert!(cache.end_session("s1").await.unwrap());
        assert!(cache.active_session("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_preserves_existing_message_count() {
        let cache = cache();
        cache.mark_session_active("s1", "api").await.unwrap();
        cache.record_message("s1").await.unwrap();

        cache.touch_session("s1", "api").await.unwrap();
        let state = cache.active_session("s1").await.unwrap().unwrap();
        assert_eq!(state.message_count, 1);

        // Touching an unknown session creates fresh state.
        cache.touch_session("s2", "web").await.unwrap();
        let created = cache.active_session("s2").await.unwrap().unwrap();
        assert_eq!(created.project, "web");
    }
}
