//! Evaluation job store
//!
//! Authoritative, concurrency-safe persistence of evaluation jobs:
//! - `JobStore` trait with Postgres and in-memory implementations
//! - Optimistic-locking updates keyed on the job `version`
//! - Status transitions restricted to the job state machine

mod memory;
mod store;

pub mod dispatcher;

pub use memory::MemoryJobStore;
pub use store::PgJobStore;

use crate::db::models::{EvaluationJob, JobStatus};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Attempts for optimistic-lock retry loops
const TRANSITION_ATTEMPTS: u32 = 3;

/// Base backoff for optimistic-lock retries in milliseconds (doubles per attempt)
const TRANSITION_BACKOFF_MS: u64 = 50;

/// Fields for a new job record
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: String,
    pub owner_id: Uuid,
    pub job_title: String,
    pub cv_doc_id: Uuid,
    pub project_doc_id: Uuid,
}

/// Partial update applied through the optimistic-locking path
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub error_message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub increment_retry: bool,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
}

/// Extra fields carried along with a status transition
#[derive(Debug, Clone, Default)]
pub struct TransitionExtras {
    pub error_message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub increment_retry: bool,
}

/// List filter and pagination parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    pub status: Option<JobStatus>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            status: None,
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl ListQuery {
    /// Page clamped to >= 1, limit clamped to 1..=100
    pub fn normalized(&self) -> (u64, u64) {
        (self.page.max(1), self.limit.clamp(1, 100))
    }
}

/// One page of jobs plus pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<EvaluationJob>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl JobPage {
    pub fn new(jobs: Vec<EvaluationJob>, page: u64, limit: u64, total: u64) -> Self {
        let total_pages = total.div_ceil(limit).max(1);
        Self {
            jobs,
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Durable job persistence
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Upsert-by-`job_id`: returns the existing record when one is
    /// already present, otherwise inserts a fresh `queued` record.
    /// Safe to race: a concurrent insert resolves to a re-read.
    async fn create_atomic(&self, new: NewJob) -> Result<EvaluationJob>;

    /// Fetch by public job id regardless of owner (worker-internal)
    async fn get(&self, job_id: &str) -> Result<Option<EvaluationJob>>;

    /// Fetch by public job id scoped to an owner
    async fn find(&self, job_id: &str, owner_id: Uuid) -> Result<Option<EvaluationJob>>;

    /// List an owner's jobs with pagination
    async fn list(&self, owner_id: Uuid, query: &ListQuery) -> Result<JobPage>;

    /// Compare-and-swap update: applies `patch` iff the stored version
    /// still equals `expected_version`, bumping `version` by one.
    /// Returns `AppError::Concurrency` on mismatch.
    async fn update_optimistic(
        &self,
        job_id: &str,
        expected_version: i32,
        patch: JobPatch,
    ) -> Result<EvaluationJob>;
}

/// Drive a status transition through the optimistic-locking path.
///
/// Re-reads the record and retries the compare-and-swap up to three
/// times with exponential backoff. Rejects transitions the state
/// machine does not permit, including any attempt to exit a terminal
/// state.
pub async fn transition_status(
    store: &dyn JobStore,
    job_id: &str,
    new_status: JobStatus,
    extras: TransitionExtras,
) -> Result<EvaluationJob> {
    let mut attempt = 0;
    loop {
        let current = store
            .get(job_id)
            .await?
            .ok_or_else(|| AppError::JobNotFound { id: job_id.into() })?;

        let current_status = current.job_status();
        if !current_status.can_transition_to(new_status) {
            return Err(AppError::InvalidTransition {
                from: current_status.as_str().into(),
                to: new_status.as_str().into(),
            });
        }

        let now = Utc::now();
        let patch = JobPatch {
            status: Some(new_status),
            error_message: extras.error_message.clone(),
            result: extras.result.clone(),
            increment_retry: extras.increment_retry,
            processing_started_at: (new_status == JobStatus::Processing).then_some(now),
            processing_completed_at: matches!(
                new_status,
                JobStatus::Completed | JobStatus::Failed
            )
            .then_some(now),
        };

        match store
            .update_optimistic(job_id, current.version, patch)
            .await
        {
            Ok(updated) => return Ok(updated),
            Err(AppError::Concurrency { .. }) if attempt + 1 < TRANSITION_ATTEMPTS => {
                let delay = TRANSITION_BACKOFF_MS * 2u64.pow(attempt);
                tracing::debug!(
                    job_id,
                    attempt = attempt + 1,
                    delay_ms = delay,
                    "Version conflict on transition, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(job_id: &str) -> NewJob {
        NewJob {
            job_id: job_id.into(),
            owner_id: Uuid::new_v4(),
            job_title: "Backend Engineer".into(),
            cv_doc_id: Uuid::new_v4(),
            project_doc_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_create_atomic_is_idempotent() {
        let store = MemoryJobStore::new();
        let a = store.create_atomic(new_job("eval_a_1")).await.unwrap();
        let b = store.create_atomic(new_job("eval_a_1")).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.version, b.version);
    }

    #[tokio::test]
    async fn test_transition_sets_timestamps_and_version() {
        let store = MemoryJobStore::new();
        let created = store.create_atomic(new_job("eval_t_1")).await.unwrap();
        assert_eq!(created.job_status(), JobStatus::Queued);
        assert!(created.processing_started_at.is_none());

        let processing = transition_status(
            &store,
            "eval_t_1",
            JobStatus::Processing,
            TransitionExtras::default(),
        )
        .await
        .unwrap();
        assert_eq!(processing.version, created.version + 1);
        assert!(processing.processing_started_at.is_some());
        assert!(processing.processing_completed_at.is_none());

        let completed = transition_status(
            &store,
            "eval_t_1",
            JobStatus::Completed,
            TransitionExtras {
                result: Some(serde_json::json!({"ok": true})),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(completed.version, processing.version + 1);
        assert!(completed.processing_completed_at.is_some());
        assert!(completed.result.is_some());
    }

    #[tokio::test]
    async fn test_terminal_state_is_sticky() {
        let store = MemoryJobStore::new();
        store.create_atomic(new_job("eval_t_2")).await.unwrap();
        transition_status(
            &store,
            "eval_t_2",
            JobStatus::Cancelled,
            TransitionExtras::default(),
        )
        .await
        .unwrap();

        let err = transition_status(
            &store,
            "eval_t_2",
            JobStatus::Processing,
            TransitionExtras::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryJobStore::new();
        let created = store.create_atomic(new_job("eval_t_3")).await.unwrap();

        // First CAS wins, second against the same version loses.
        store
            .update_optimistic(
                "eval_t_3",
                created.version,
                JobPatch {
                    status: Some(JobStatus::Processing),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = store
            .update_optimistic(
                "eval_t_3",
                created.version,
                JobPatch {
                    status: Some(JobStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Concurrency { .. }));
    }

    #[tokio::test]
    async fn test_list_pagination_metadata() {
        let store = MemoryJobStore::new();
        let owner = Uuid::new_v4();
        for i in 0..5 {
            let mut job = new_job(&format!("eval_p_{}", i));
            job.owner_id = owner;
            store.create_atomic(job).await.unwrap();
        }

        let page = store
            .list(
                owner,
                &ListQuery {
                    status: None,
                    page: 1,
                    limit: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.jobs.len(), 2);
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(!page.has_prev);

        let last = store
            .list(
                owner,
                &ListQuery {
                    status: None,
                    page: 3,
                    limit: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(last.jobs.len(), 1);
        assert!(!last.has_next);
        assert!(last.has_prev);
    }
}
