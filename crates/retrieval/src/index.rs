//! Retrieval index
//!
//! Collection-partitioned embedding search over reference material.
//! Indexing failures surface to the caller; search failures never do —
//! the engine receives an empty context list and proceeds.

use crate::chunker::{chunk_text, ChunkingConfig};
use crate::store::{ChunkMetadata, ChunkRecord, ScoredChunk, SearchFilter, VectorStore};
use chrono::Utc;
use hirelens_common::config::RetrievalConfig;
use hirelens_common::db::models::Document;
use hirelens_common::errors::{AppError, Result};
use hirelens_common::llm::Embedder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reference collection names
pub mod collections {
    pub const JOB_DESCRIPTIONS: &str = "job_descriptions";
    pub const CV_DOCUMENTS: &str = "cv_documents";
    pub const PROJECT_DOCUMENTS: &str = "project_documents";
    pub const RUBRICS: &str = "rubrics";
    pub const CASE_STUDIES: &str = "case_studies";
}

pub struct RetrievalIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    timeout: Duration,
}

impl RetrievalIndex {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chunking: ChunkingConfig {
                chunk_size: config.chunk_size,
                chunk_overlap: config.chunk_overlap,
                min_chunk_size: config.min_chunk_size,
            },
            timeout: config.timeout(),
        }
    }

    /// Chunk, embed and store a document in the named collection.
    /// Returns the number of chunks written.
    pub async fn index_document(&self, doc: &Document, collection: &str) -> Result<usize> {
        let chunks = chunk_text(&doc.extracted_text, &self.chunking);
        if chunks.is_empty() {
            debug!(doc_id = %doc.id, collection, "Nothing to index");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| AppError::LlmUnavailable {
                message: format!("embedding failed while indexing: {}", e),
            })?;

        let total = chunks.len() as i32;
        let indexed_at = Utc::now();
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| ChunkRecord {
                chunk_id: Uuid::new_v4(),
                doc_id: doc.id,
                content: chunk.content,
                embedding,
                metadata: ChunkMetadata {
                    owner_id: doc.owner_id,
                    doc_type: doc.doc_type.clone(),
                    chunk_index: chunk.index,
                    total_chunks: total,
                    indexed_at,
                },
            })
            .collect();

        let count = records.len();
        self.store.upsert(collection, records).await?;

        info!(doc_id = %doc.id, collection, chunks = count, "Document indexed");
        Ok(count)
    }

    /// Search a collection; never fails the caller. Timeouts, missing
    /// collections and embedding failures all degrade to an empty list
    /// with a warning.
    pub async fn search(
        &self,
        query: &str,
        collection: &str,
        max_results: usize,
        filter: SearchFilter,
        threshold: f32,
    ) -> Vec<ScoredChunk> {
        let lookup = async {
            let embedding = self.embedder.embed(query).await.map_err(|e| {
                AppError::LlmUnavailable {
                    message: format!("query embedding failed: {}", e),
                }
            })?;

            self.store
                .search(collection, &embedding, max_results, threshold, &filter)
                .await
        };

        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(hits)) => {
                debug!(collection, hits = hits.len(), "Retrieval search");
                hits
            }
            Ok(Err(e)) => {
                warn!(collection, error = %e, "Retrieval search failed, returning empty context");
                metrics::counter!(hirelens_common::metrics::RETRIEVAL_EMPTY_RESULTS).increment(1);
                Vec::new()
            }
            Err(_) => {
                warn!(collection, "Retrieval search timed out, returning empty context");
                metrics::counter!(hirelens_common::metrics::RETRIEVAL_EMPTY_RESULTS).increment(1);
                Vec::new()
            }
        }
    }

    /// Remove a document's chunks from a collection
    pub async fn remove(&self, doc_id: Uuid, collection: &str) -> Result<()> {
        self.store.remove(collection, doc_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryVectorStore;
    use async_trait::async_trait;
    use hirelens_common::db::models::DocType;
    use hirelens_common::llm::{hash_embedding, LlmError};

    /// Deterministic embedder backed by the hash fallback
    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, LlmError> {
            Ok(hash_embedding(text))
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts.iter().map(|t| hash_embedding(t)).collect())
        }
    }

    /// Embedder that always fails
    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, LlmError> {
            Err(LlmError::Transient {
                message: "down".into(),
                status_code: Some(503),
            })
        }

        async fn embed_batch(
            &self,
            _texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
            Err(LlmError::Transient {
                message: "down".into(),
                status_code: Some(503),
            })
        }
    }

    /// Store whose search always errors
    struct BrokenStore;

    #[async_trait]
    impl VectorStore for BrokenStore {
        async fn upsert(&self, _collection: &str, _chunks: Vec<ChunkRecord>) -> Result<()> {
            Err(AppError::Persistence {
                message: "unreachable".into(),
            })
        }

        async fn search(
            &self,
            _collection: &str,
            _embedding: &[f32],
            _limit: usize,
            _threshold: f32,
            _filter: &SearchFilter,
        ) -> Result<Vec<ScoredChunk>> {
            Err(AppError::Persistence {
                message: "unreachable".into(),
            })
        }

        async fn remove(&self, _collection: &str, _doc_id: Uuid) -> Result<()> {
            Err(AppError::Persistence {
                message: "unreachable".into(),
            })
        }
    }

    fn doc(text: &str) -> Document {
        Document {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            doc_type: DocType::JobDescription.as_str().to_string(),
            extracted_text: text.to_string(),
            vectorized: false,
            created_at: Utc::now().into(),
        }
    }

    fn config() -> RetrievalConfig {
        RetrievalConfig {
            chunk_size: 200,
            chunk_overlap: 50,
            min_chunk_size: 20,
            timeout_secs: 2,
            max_results: 5,
            similarity_threshold: 0.0,
        }
    }

    fn index_with(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> RetrievalIndex {
        RetrievalIndex::new(store, embedder, &config())
    }

    #[tokio::test]
    async fn test_index_then_search() {
        let store = Arc::new(MemoryVectorStore::new());
        let index = index_with(store.clone(), Arc::new(HashEmbedder));

        let document = doc(&"Backend engineer role requiring Rust and Postgres experience. ".repeat(10));
        let count = index
            .index_document(&document, collections::JOB_DESCRIPTIONS)
            .await
            .unwrap();
        assert!(count > 0);
        assert_eq!(store.collection_len(collections::JOB_DESCRIPTIONS), count);

        let hits = index
            .search(
                "Backend engineer role requiring Rust",
                collections::JOB_DESCRIPTIONS,
                3,
                SearchFilter::default(),
                -1.0,
            )
            .await;
        assert!(!hits.is_empty());
        assert!(hits.len() <= 3);
    }

    #[tokio::test]
    async fn test_search_failures_degrade_to_empty() {
        // Broken store
        let index = index_with(Arc::new(BrokenStore), Arc::new(HashEmbedder));
        let hits = index
            .search(
                "anything",
                collections::RUBRICS,
                5,
                SearchFilter::default(),
                0.0,
            )
            .await;
        assert!(hits.is_empty());

        // Broken embedder
        let index = index_with(Arc::new(MemoryVectorStore::new()), Arc::new(FailingEmbedder));
        let hits = index
            .search(
                "anything",
                collections::RUBRICS,
                5,
                SearchFilter::default(),
                0.0,
            )
            .await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_index_failure_surfaces() {
        let index = index_with(Arc::new(MemoryVectorStore::new()), Arc::new(FailingEmbedder));
        let document = doc(&"Some reference text long enough to chunk. ".repeat(10));
        let err = index
            .index_document(&document, collections::CASE_STUDIES)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LlmUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = Arc::new(MemoryVectorStore::new());
        let index = index_with(store.clone(), Arc::new(HashEmbedder));
        let document = doc(&"Case study text with enough length to produce chunks. ".repeat(10));
        index
            .index_document(&document, collections::CASE_STUDIES)
            .await
            .unwrap();
        assert!(store.collection_len(collections::CASE_STUDIES) > 0);

        index
            .remove(document.id, collections::CASE_STUDIES)
            .await
            .unwrap();
        assert_eq!(store.collection_len(collections::CASE_STUDIES), 0);
    }
}
