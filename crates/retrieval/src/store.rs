//! Vector store backends
//!
//! Chunk persistence and nearest-neighbor search partitioned by
//! collection. Backed by pgvector in production and by an in-memory
//! cosine scan in tests and single-process deployments.

use chrono::{DateTime, Utc};
use hirelens_common::db::DbPool;
use hirelens_common::errors::{AppError, Result};
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// A stored chunk: text, embedding and provenance metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: Uuid,
    pub doc_id: Uuid,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Metadata carried on every chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub owner_id: Uuid,
    pub doc_type: String,
    pub chunk_index: i32,
    pub total_chunks: i32,
    pub indexed_at: DateTime<Utc>,
}

/// A search hit with its cosine similarity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: Uuid,
    pub doc_id: Uuid,
    pub content: String,
    pub doc_type: String,
    pub chunk_index: i32,
    /// Cosine similarity in [−1, 1] (= 1 − cosine distance)
    pub score: f32,
}

/// Optional metadata filter applied during search
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub owner_id: Option<Uuid>,
    pub doc_type: Option<String>,
}

/// Chunk persistence and similarity search per named collection
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Write chunks into a collection
    async fn upsert(&self, collection: &str, chunks: Vec<ChunkRecord>) -> Result<()>;

    /// Top-`limit` chunks by cosine similarity at or above `threshold`,
    /// sorted descending
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>>;

    /// Remove all chunks of a document from a collection
    async fn remove(&self, collection: &str, doc_id: Uuid) -> Result<()>;
}

// ============================================================================
// Postgres / pgvector
// ============================================================================

/// pgvector-backed store over the `reference_chunks` table
#[derive(Clone)]
pub struct PgVectorStore {
    pool: DbPool,
}

impl PgVectorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn embedding_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

#[async_trait::async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert(&self, collection: &str, chunks: Vec<ChunkRecord>) -> Result<()> {
        for chunk in chunks {
            let stmt = Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                INSERT INTO reference_chunks (
                    id, doc_id, collection, content, embedding,
                    owner_id, doc_type, chunk_index, total_chunks, indexed_at
                )
                VALUES ($1, $2, $3, $4, $5::vector, $6, $7, $8, $9, $10)
                ON CONFLICT (id) DO UPDATE SET
                    content = EXCLUDED.content,
                    embedding = EXCLUDED.embedding,
                    indexed_at = EXCLUDED.indexed_at
                "#,
                vec![
                    chunk.chunk_id.into(),
                    chunk.doc_id.into(),
                    collection.into(),
                    chunk.content.into(),
                    embedding_literal(&chunk.embedding).into(),
                    chunk.metadata.owner_id.into(),
                    chunk.metadata.doc_type.into(),
                    chunk.metadata.chunk_index.into(),
                    chunk.metadata.total_chunks.into(),
                    sea_orm::prelude::DateTimeWithTimeZone::from(chunk.metadata.indexed_at)
                        .into(),
                ],
            );

            self.pool.conn().execute(stmt).await?;
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let embedding_str = embedding_literal(embedding);

        let mut conditions = String::new();
        let mut values: Vec<sea_orm::Value> = vec![
            collection.into(),
            (threshold as f64).into(),
            (limit as i64).into(),
        ];

        if let Some(owner_id) = filter.owner_id {
            values.push(owner_id.into());
            conditions.push_str(&format!(" AND owner_id = ${}", values.len()));
        }
        if let Some(doc_type) = &filter.doc_type {
            values.push(doc_type.clone().into());
            conditions.push_str(&format!(" AND doc_type = ${}", values.len()));
        }

        let sql = format!(
            r#"
            SELECT
                id as chunk_id,
                doc_id,
                content,
                doc_type,
                chunk_index,
                1 - (embedding <=> '{embedding}'::vector) as score
            FROM reference_chunks
            WHERE collection = $1
              AND 1 - (embedding <=> '{embedding}'::vector) >= $2
              {conditions}
            ORDER BY embedding <=> '{embedding}'::vector
            LIMIT $3
            "#,
            embedding = embedding_str,
            conditions = conditions,
        );

        let rows = self
            .pool
            .conn()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                values,
            ))
            .await
            .map_err(|e| AppError::Persistence {
                message: format!("Vector search failed: {}", e),
            })?;

        let chunks = rows
            .iter()
            .filter_map(|row| {
                Some(ScoredChunk {
                    chunk_id: row.try_get("", "chunk_id").ok()?,
                    doc_id: row.try_get("", "doc_id").ok()?,
                    content: row.try_get("", "content").ok()?,
                    doc_type: row.try_get("", "doc_type").ok()?,
                    chunk_index: row.try_get("", "chunk_index").ok()?,
                    score: row.try_get::<f64>("", "score").ok()? as f32,
                })
            })
            .collect();

        Ok(chunks)
    }

    async fn remove(&self, collection: &str, doc_id: Uuid) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM reference_chunks WHERE collection = $1 AND doc_id = $2",
            vec![collection.into(), doc_id.into()],
        );

        self.pool.conn().execute(stmt).await?;
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory store with a linear cosine scan
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<ChunkRecord>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks stored in a collection (test helper)
    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

/// Cosine similarity; 0 for mismatched dimensions or zero norms so
/// degenerate vectors rank last instead of erroring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (dot / denom) as f32
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, collection: &str, chunks: Vec<ChunkRecord>) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        let entries = collections.entry(collection.to_string()).or_default();
        for chunk in chunks {
            entries.retain(|existing| existing.chunk_id != chunk.chunk_id);
            entries.push(chunk);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let collections = self.collections.read().unwrap();
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredChunk> = entries
            .iter()
            .filter(|chunk| {
                filter
                    .owner_id
                    .map(|owner| chunk.metadata.owner_id == owner)
                    .unwrap_or(true)
                    && filter
                        .doc_type
                        .as_deref()
                        .map(|ty| chunk.metadata.doc_type == ty)
                        .unwrap_or(true)
            })
            .map(|chunk| ScoredChunk {
                chunk_id: chunk.chunk_id,
                doc_id: chunk.doc_id,
                content: chunk.content.clone(),
                doc_type: chunk.metadata.doc_type.clone(),
                chunk_index: chunk.metadata.chunk_index,
                score: cosine_similarity(embedding, &chunk.embedding),
            })
            .filter(|scored| scored.score >= threshold)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored)
    }

    async fn remove(&self, collection: &str, doc_id: Uuid) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        if let Some(entries) = collections.get_mut(collection) {
            entries.retain(|chunk| chunk.doc_id != doc_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(owner_id: Uuid, doc_id: Uuid, index: i32, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            chunk_id: Uuid::new_v4(),
            doc_id,
            content: format!("chunk {}", index),
            embedding,
            metadata: ChunkMetadata {
                owner_id,
                doc_type: "job_description".into(),
                chunk_index: index,
                total_chunks: 2,
                indexed_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        // Dimension mismatch and zero vectors score 0 instead of erroring
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_orders_and_thresholds() {
        let store = MemoryVectorStore::new();
        let owner = Uuid::new_v4();
        let doc = Uuid::new_v4();
        store
            .upsert(
                "job_descriptions",
                vec![
                    chunk(owner, doc, 0, vec![1.0, 0.0]),
                    chunk(owner, doc, 1, vec![0.7, 0.7]),
                    chunk(owner, doc, 2, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search(
                "job_descriptions",
                &[1.0, 0.0],
                10,
                0.5,
                &SearchFilter::default(),
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_index, 0);
        assert_eq!(hits[1].chunk_index, 1);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_respects_filters() {
        let store = MemoryVectorStore::new();
        let owner_a = Uuid::new_v4();
        let owner_b = Uuid::new_v4();
        store
            .upsert(
                "rubrics",
                vec![
                    chunk(owner_a, Uuid::new_v4(), 0, vec![1.0, 0.0]),
                    chunk(owner_b, Uuid::new_v4(), 0, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search(
                "rubrics",
                &[1.0, 0.0],
                10,
                0.0,
                &SearchFilter {
                    owner_id: Some(owner_a),
                    doc_type: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = store
            .search(
                "rubrics",
                &[1.0, 0.0],
                10,
                0.0,
                &SearchFilter {
                    owner_id: None,
                    doc_type: Some("cv_rubric".into()),
                },
            )
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let store = MemoryVectorStore::new();
        let hits = store
            .search("case_studies", &[1.0], 5, 0.0, &SearchFilter::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_remove_by_doc() {
        let store = MemoryVectorStore::new();
        let owner = Uuid::new_v4();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        store
            .upsert(
                "cv_documents",
                vec![
                    chunk(owner, doc_a, 0, vec![1.0]),
                    chunk(owner, doc_b, 0, vec![1.0]),
                ],
            )
            .await
            .unwrap();

        store.remove("cv_documents", doc_a).await.unwrap();
        assert_eq!(store.collection_len("cv_documents"), 1);
    }
}
