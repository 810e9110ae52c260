//! In-memory job store
//!
//! Same contract as the Postgres store, backed by a mutex-guarded map.
//! Used by tests and single-process deployments.

use super::{JobPage, JobPatch, JobStore, ListQuery, NewJob};
use crate::db::models::{EvaluationJob, JobStatus};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, EvaluationJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs (test helper)
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn apply_patch(job: &mut EvaluationJob, patch: JobPatch) {
    if let Some(status) = patch.status {
        job.status = status.as_str().to_string();
    }
    if let Some(message) = patch.error_message {
        job.error_message = Some(message);
    }
    if let Some(result) = patch.result {
        job.result = Some(result);
    }
    if patch.increment_retry {
        job.retry_count += 1;
    }
    if let Some(at) = patch.processing_started_at {
        job.processing_started_at = Some(at.into());
    }
    if let Some(at) = patch.processing_completed_at {
        job.processing_completed_at = Some(at.into());
    }
    job.version += 1;
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_atomic(&self, new: NewJob) -> Result<EvaluationJob> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(existing) = jobs.get(&new.job_id) {
            return Ok(existing.clone());
        }

        let record = EvaluationJob {
            id: Uuid::new_v4(),
            job_id: new.job_id.clone(),
            owner_id: new.owner_id,
            job_title: new.job_title,
            cv_doc_id: new.cv_doc_id,
            project_doc_id: new.project_doc_id,
            status: JobStatus::Queued.as_str().to_string(),
            version: 1,
            retry_count: 0,
            error_message: None,
            result: None,
            created_at: Utc::now().into(),
            processing_started_at: None,
            processing_completed_at: None,
        };
        jobs.insert(new.job_id, record.clone());
        Ok(record)
    }

    async fn get(&self, job_id: &str) -> Result<Option<EvaluationJob>> {
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }

    async fn find(&self, job_id: &str, owner_id: Uuid) -> Result<Option<EvaluationJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .get(job_id)
            .filter(|job| job.owner_id == owner_id)
            .cloned())
    }

    async fn list(&self, owner_id: Uuid, query: &ListQuery) -> Result<JobPage> {
        let (page, limit) = query.normalized();
        let jobs = self.jobs.lock().unwrap();

        let mut matching: Vec<EvaluationJob> = jobs
            .values()
            .filter(|job| job.owner_id == owner_id)
            .filter(|job| {
                query
                    .status
                    .map(|status| job.job_status() == status)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let start = ((page - 1) * limit) as usize;
        let page_jobs: Vec<EvaluationJob> = matching
            .into_iter()
            .skip(start)
            .take(limit as usize)
            .collect();

        Ok(JobPage::new(page_jobs, page, limit, total))
    }

    async fn update_optimistic(
        &self,
        job_id: &str,
        expected_version: i32,
        patch: JobPatch,
    ) -> Result<EvaluationJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| AppError::JobNotFound { id: job_id.into() })?;

        if job.version != expected_version {
            return Err(AppError::Concurrency {
                job_id: job_id.into(),
                attempts: 1,
            });
        }

        apply_patch(job, patch);
        Ok(job.clone())
    }
}
