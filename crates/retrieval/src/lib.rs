//! HireLens retrieval index
//!
//! Embedding-backed nearest-neighbor search over reference material
//! (job descriptions, scoring rubrics, case studies, prior CVs and
//! projects), partitioned into named collections.

pub mod chunker;
pub mod index;
pub mod store;

pub use chunker::{chunk_text, ChunkingConfig, TextChunk};
pub use index::{collections, RetrievalIndex};
pub use store::{
    cosine_similarity, ChunkMetadata, ChunkRecord, MemoryVectorStore, PgVectorStore, ScoredChunk,
    SearchFilter, VectorStore,
};
