//! Retrieval layer: embeddings, vector search, and context assembly

pub mod embedding;
pub mod models;
pub mod store;
pub mod strategy;

pub use embedding::EmbeddingClient;
pub use models::{ChunkCategory, ContextChunk, Partition, ScoredChunk};
pub use store::{CorpusLoader, FileCorpusLoader, QdrantSearch, SimilaritySearch};
pub use strategy::{AlwaysFetch, CacheOnce, Hybrid, RetrievalStrategy, STATIC_POLICY_QUERY};
