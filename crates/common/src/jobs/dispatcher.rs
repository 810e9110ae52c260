//! Evaluation dispatcher
//!
//! Owns the submission contract: validates input, mints the job id,
//! persists the `queued` record, and hands the work item to the queue.
//! Also serves status, listing and cancellation.

use super::{transition_status, JobPage, JobStore, ListQuery, NewJob, TransitionExtras};
use crate::db::models::{DocType, Document, EvaluationJob, JobStatus};
use crate::documents::DocumentProvider;
use crate::errors::{AppError, Result};
use crate::queue::{EvaluationTask, TaskQueue};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

const JOB_TITLE_MIN: usize = 3;
const JOB_TITLE_MAX: usize = 100;

/// Submission parameters
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub owner_id: Uuid,
    pub job_title: String,
    pub cv_doc_id: Uuid,
    pub project_doc_id: Uuid,
}

/// Synchronous response to a submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub job_id: String,
    pub status: JobStatus,
    pub estimated_completion: String,
}

pub struct Dispatcher {
    documents: Arc<dyn DocumentProvider>,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
}

impl Dispatcher {
    pub fn new(
        documents: Arc<dyn DocumentProvider>,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            documents,
            store,
            queue,
        }
    }

    /// Accept a submission: validate, persist `queued`, enqueue.
    ///
    /// The path is strictly synchronous up to the enqueue; evaluation
    /// itself happens on the worker pool. A failed enqueue after a
    /// successful insert marks the job failed before returning.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt> {
        let title = request.job_title.trim();
        let title_len = title.chars().count();
        if !(JOB_TITLE_MIN..=JOB_TITLE_MAX).contains(&title_len) {
            return Err(AppError::Validation {
                message: format!(
                    "job_title must be {}-{} characters, got {}",
                    JOB_TITLE_MIN, JOB_TITLE_MAX, title_len
                ),
                field: Some("job_title".into()),
            });
        }

        let cv = self
            .resolve_document(request.cv_doc_id, request.owner_id, DocType::Cv, "cv_doc_id")
            .await?;
        let project = self
            .resolve_document(
                request.project_doc_id,
                request.owner_id,
                DocType::ProjectReport,
                "project_doc_id",
            )
            .await?;

        let job_id = mint_job_id();
        let record = self
            .store
            .create_atomic(NewJob {
                job_id: job_id.clone(),
                owner_id: request.owner_id,
                job_title: title.to_string(),
                cv_doc_id: cv.id,
                project_doc_id: project.id,
            })
            .await?;

        let task = EvaluationTask {
            job_id: record.job_id.clone(),
            record_id: record.id,
            owner_id: record.owner_id,
            job_title: record.job_title.clone(),
            cv_text: cv.extracted_text,
            project_text: project.extracted_text,
        };

        if let Err(e) = self.queue.enqueue(&task).await {
            error!(job_id = %record.job_id, error = %e, "Enqueue failed after insert");
            let extras = TransitionExtras {
                error_message: Some(format!("enqueue failed: {}", e.job_message())),
                ..Default::default()
            };
            if let Err(mark_err) =
                transition_status(self.store.as_ref(), &record.job_id, JobStatus::Failed, extras)
                    .await
            {
                error!(
                    job_id = %record.job_id,
                    error = %mark_err,
                    "Failed to mark job failed after enqueue error"
                );
            }
            return Err(e);
        }

        metrics::counter!(crate::metrics::JOBS_SUBMITTED).increment(1);
        info!(job_id = %record.job_id, owner_id = %record.owner_id, "Evaluation job queued");

        Ok(SubmitReceipt {
            job_id: record.job_id,
            status: JobStatus::Queued,
            estimated_completion: (Utc::now() + Duration::minutes(3)).to_rfc3339(),
        })
    }

    /// Fetch a job within an owner scope. Cross-owner lookups report
    /// not-found so existence never leaks.
    pub async fn get_status(&self, job_id: &str, owner_id: Uuid) -> Result<EvaluationJob> {
        self.store
            .find(job_id, owner_id)
            .await?
            .ok_or_else(|| AppError::JobNotFound { id: job_id.into() })
    }

    /// List an owner's jobs with pagination metadata
    pub async fn list(&self, owner_id: Uuid, query: &ListQuery) -> Result<JobPage> {
        self.store.list(owner_id, query).await
    }

    /// Cancel a job. Permitted from `queued` and `processing`;
    /// cancelling an already-cancelled job is a no-op returning the
    /// same record.
    pub async fn cancel(&self, job_id: &str, owner_id: Uuid) -> Result<EvaluationJob> {
        let job = self.get_status(job_id, owner_id).await?;

        match job.job_status() {
            JobStatus::Cancelled => Ok(job),
            JobStatus::Queued | JobStatus::Processing => {
                let cancelled = transition_status(
                    self.store.as_ref(),
                    job_id,
                    JobStatus::Cancelled,
                    TransitionExtras::default(),
                )
                .await?;
                metrics::counter!(crate::metrics::JOBS_CANCELLED).increment(1);
                info!(job_id, "Evaluation job cancelled");
                Ok(cancelled)
            }
            terminal => Err(AppError::InvalidTransition {
                from: terminal.as_str().into(),
                to: JobStatus::Cancelled.as_str().into(),
            }),
        }
    }

    async fn resolve_document(
        &self,
        doc_id: Uuid,
        owner_id: Uuid,
        expected: DocType,
        field: &str,
    ) -> Result<Document> {
        let doc = self
            .documents
            .get_document(doc_id, owner_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: doc_id.to_string(),
            })?;

        if doc.document_type() != Some(expected) {
            return Err(AppError::Validation {
                message: format!(
                    "{} must reference a {} document, got {}",
                    field,
                    expected.as_str(),
                    doc.doc_type
                ),
                field: Some(field.into()),
            });
        }

        if doc.extracted_text.trim().is_empty() {
            return Err(AppError::Validation {
                message: format!("document {} has no extracted text", doc_id),
                field: Some(field.into()),
            });
        }

        Ok(doc)
    }
}

/// Mint a public job identifier: `eval_<base36 millis>_<12 hex>`.
/// Collisions are negligible and `create_atomic` makes an observed
/// collision safe anyway.
pub fn mint_job_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..12)
        .map(|_| {
            let digit: u8 = rng.gen_range(0..16);
            char::from_digit(digit as u32, 16).unwrap()
        })
        .collect();
    format!("eval_{}_{}", to_base36(millis), suffix)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}
