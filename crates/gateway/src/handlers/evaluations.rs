//! Evaluation job handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::OwnerId;
use crate::AppState;
use hirelens_common::db::models::EvaluationJob;
use hirelens_common::errors::Result;
use hirelens_common::jobs::dispatcher::{SubmitReceipt, SubmitRequest};
use hirelens_common::jobs::ListQuery;

/// Submission payload
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub job_title: String,
    pub cv_doc_id: Uuid,
    pub project_doc_id: Uuid,
}

/// Owner-visible view of a job, minus system-internal fields
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub job_title: String,
    pub status: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl From<EvaluationJob> for JobResponse {
    fn from(job: EvaluationJob) -> Self {
        let failed = job.job_status() == hirelens_common::db::models::JobStatus::Failed;
        Self {
            job_id: job.job_id,
            job_title: job.job_title,
            status: job.status,
            created_at: job.created_at.to_rfc3339(),
            processing_started_at: job.processing_started_at.map(|dt| dt.to_rfc3339()),
            processing_completed_at: job.processing_completed_at.map(|dt| dt.to_rfc3339()),
            error_message: if failed { job.error_message } else { None },
            retry_count: failed.then_some(job.retry_count),
            result: job.result,
        }
    }
}

/// Paginated listing response
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Submit an evaluation
pub async fn submit(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<SubmitReceipt>)> {
    let receipt = state
        .dispatcher
        .submit(SubmitRequest {
            owner_id,
            job_title: body.job_title,
            cv_doc_id: body.cv_doc_id,
            project_doc_id: body.project_doc_id,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// Get the status of one job
pub async fn get_status(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>> {
    let job = state.dispatcher.get_status(&job_id, owner_id).await?;
    Ok(Json(job.into()))
}

/// List the owner's jobs
pub async fn list(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Query(query): Query<ListQuery>,
) -> Result<Json<JobListResponse>> {
    let page = state.dispatcher.list(owner_id, &query).await?;
    Ok(Json(JobListResponse {
        jobs: page.jobs.into_iter().map(Into::into).collect(),
        page: page.page,
        limit: page.limit,
        total: page.total,
        total_pages: page.total_pages,
        has_next: page.has_next,
        has_prev: page.has_prev,
    }))
}

/// Cancel a queued or processing job
pub async fn cancel(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>> {
    let job = state.dispatcher.cancel(&job_id, owner_id).await?;
    Ok(Json(job.into()))
}
