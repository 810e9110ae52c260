//! Document provider
//!
//! Documents are written by the external upload subsystem; the
//! evaluation core only resolves them by id within an owner scope.

use crate::db::models::{Document, DocumentColumn, DocumentEntity};
use crate::db::DbPool;
use crate::errors::Result;
use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Read-only access to uploaded documents
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Resolve a document by id within an owner scope.
    /// Cross-owner lookups return `None` so existence never leaks.
    async fn get_document(&self, doc_id: Uuid, owner_id: Uuid) -> Result<Option<Document>>;
}

/// Postgres-backed document provider
#[derive(Clone)]
pub struct PgDocumentProvider {
    pool: DbPool,
}

impl PgDocumentProvider {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentProvider for PgDocumentProvider {
    async fn get_document(&self, doc_id: Uuid, owner_id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(doc_id)
            .filter(DocumentColumn::OwnerId.eq(owner_id))
            .one(self.pool.conn())
            .await
            .map_err(Into::into)
    }
}

/// In-memory document provider for tests
#[derive(Default)]
pub struct MemoryDocumentProvider {
    docs: Mutex<HashMap<Uuid, Document>>,
}

impl MemoryDocumentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc: Document) {
        self.docs.lock().unwrap().insert(doc.id, doc);
    }
}

#[async_trait]
impl DocumentProvider for MemoryDocumentProvider {
    async fn get_document(&self, doc_id: Uuid, owner_id: Uuid) -> Result<Option<Document>> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .get(&doc_id)
            .filter(|doc| doc.owner_id == owner_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DocType;
    use chrono::Utc;

    fn doc(owner_id: Uuid, doc_type: DocType) -> Document {
        Document {
            id: Uuid::new_v4(),
            owner_id,
            doc_type: doc_type.as_str().to_string(),
            extracted_text: "text".into(),
            vectorized: false,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_cross_owner_lookup_misses() {
        let provider = MemoryDocumentProvider::new();
        let owner = Uuid::new_v4();
        let stored = doc(owner, DocType::Cv);
        let doc_id = stored.id;
        provider.insert(stored);

        assert!(provider
            .get_document(doc_id, owner)
            .await
            .unwrap()
            .is_some());
        assert!(provider
            .get_document(doc_id, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }
}
