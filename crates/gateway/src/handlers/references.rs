//! Reference material handlers
//!
//! Index uploaded reference documents (job descriptions, rubrics, case
//! studies, prior CVs and projects) into their retrieval collections.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::OwnerId;
use crate::AppState;
use hirelens_common::db::models::DocType;
use hirelens_common::errors::{AppError, Result};
use hirelens_retrieval::collections;

#[derive(Debug, Deserialize)]
pub struct IndexBody {
    pub doc_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub doc_id: Uuid,
    pub collection: String,
    pub chunks: usize,
}

/// Which collection a document type lands in
fn collection_for(doc_type: DocType) -> &'static str {
    match doc_type {
        DocType::JobDescription => collections::JOB_DESCRIPTIONS,
        DocType::CvRubric | DocType::ProjectRubric => collections::RUBRICS,
        DocType::CaseStudy => collections::CASE_STUDIES,
        DocType::Cv => collections::CV_DOCUMENTS,
        DocType::ProjectReport => collections::PROJECT_DOCUMENTS,
    }
}

/// Index a reference document into its collection
pub async fn index(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(body): Json<IndexBody>,
) -> Result<(StatusCode, Json<IndexResponse>)> {
    let doc = state
        .documents
        .get_document(body.doc_id, owner_id)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound {
            id: body.doc_id.to_string(),
        })?;

    let doc_type = doc.document_type().ok_or_else(|| AppError::Validation {
        message: format!("unknown document type: {}", doc.doc_type),
        field: Some("doc_id".into()),
    })?;

    let collection = collection_for(doc_type);
    let chunks = state.retrieval.index_document(&doc, collection).await?;

    Ok((
        StatusCode::CREATED,
        Json(IndexResponse {
            doc_id: doc.id,
            collection: collection.to_string(),
            chunks,
        }),
    ))
}

/// Remove a reference document's chunks from its collection
pub async fn remove(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(doc_id): Path<Uuid>,
) -> Result<StatusCode> {
    let doc = state
        .documents
        .get_document(doc_id, owner_id)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound {
            id: doc_id.to_string(),
        })?;

    let doc_type = doc.document_type().ok_or_else(|| AppError::Validation {
        message: format!("unknown document type: {}", doc.doc_type),
        field: Some("doc_id".into()),
    })?;

    state
        .retrieval
        .remove(doc.id, collection_for(doc_type))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
