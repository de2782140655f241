//! Tiered memory retrieval and context assembly for coding assistants.
//!
//! The engine merges three tiers into one ranked, size-bounded context
//! block: a durable full-text record store, a vector-similarity index,
//! and a short-TTL cache over rendered output. The tiers fail
//! independently; any subset being down narrows the result set and
//! raises degradation flags, but never turns a read into an error.
//!
//! Backends plug in through four ports ([`RecordStore`],
//! [`VectorIndex`], [`Embedder`], [`KvCache`]). Adapters for
//! Meilisearch, Qdrant and an HTTP embedding sidecar live in
//! [`backends`], alongside in-memory implementations for development
//! and tests.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hindsight_core::backends::{HttpEmbedder, InMemoryKvCache, InMemoryRecordStore, InMemoryVectorIndex};
//! use hindsight_core::{EmbedderConfig, EngineConfig, MemoryEngine};
//!
//! #[tokio::main]
//! async fn main() -> hindsight_core::Result<()> {
//!     let engine = MemoryEngine::new(
//!         EngineConfig::default(),
//!         Arc::new(InMemoryRecordStore::new()),
//!         Arc::new(InMemoryVectorIndex::new()),
//!         Arc::new(HttpEmbedder::new(&EmbedderConfig::default())?),
//!         Arc::new(InMemoryKvCache::new()),
//!     );
//!
//!     let block = engine.generate_context("my-project", None, 10).await?;
//!     println!("{}", block.text);
//!     Ok(())
//! }
//! ```

pub mod backends;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod models;
pub mod ports;
pub mod profile;
pub mod retrieval;

pub use cache::{CacheStats, ComputedContext, ContextCache};
pub use config::{
    CacheTtlConfig, EmbedderConfig, EngineConfig, MeilisearchConfig, QdrantConfig, RetrievalConfig,
};
pub use engine::MemoryEngine;
pub use error::{EngineError, Result};
pub use formatter::ContextFormatter;
pub use models::{
    Backend, ContextBlock, EngineStatus, Memory, MemoryType, NewMemory, Profile, RankedResult,
    ResultSource, RetrievalOutcome, Session, SessionState, StoredMemory, VectorHit,
};
pub use ports::{Embedder, KvCache, RecordStore, VectorIndex};
pub use profile::ProfileManager;
pub use retrieval::RetrievalOrchestrator;
