//! Backend adapters implementing the capability ports.

pub mod embedder;
pub mod meilisearch;
pub mod memory;
pub mod qdrant;

pub use embedder::HttpEmbedder;
pub use meilisearch::MeilisearchStore;
pub use memory::{InMemoryKvCache, InMemoryRecordStore, InMemoryVectorIndex};
pub use qdrant::QdrantIndex;
