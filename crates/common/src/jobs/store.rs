//! Postgres job store
//!
//! SeaORM-backed implementation of `JobStore`. Optimistic locking is a
//! single conditional UPDATE guarded on the stored `version`; the
//! create path retries through unique-violation races on `job_id`.

use super::{JobPage, JobPatch, JobStore, ListQuery, NewJob};
use crate::db::models::{
    EvaluationJob, EvaluationJobActiveModel, EvaluationJobColumn, EvaluationJobEntity, JobStatus,
};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use std::time::Duration;
use uuid::Uuid;

/// Attempts through a unique-violation race on insert
const CREATE_ATTEMPTS: u32 = 3;

/// Base backoff for insert races in milliseconds (doubles per attempt)
const CREATE_BACKOFF_MS: u64 = 100;

#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<EvaluationJob>> {
        EvaluationJobEntity::find()
            .filter(EvaluationJobColumn::JobId.eq(job_id))
            .one(self.pool.conn())
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_atomic(&self, new: NewJob) -> Result<EvaluationJob> {
        for attempt in 0..CREATE_ATTEMPTS {
            if let Some(existing) = self.find_by_job_id(&new.job_id).await? {
                return Ok(existing);
            }

            let record = EvaluationJobActiveModel {
                id: Set(Uuid::new_v4()),
                job_id: Set(new.job_id.clone()),
                owner_id: Set(new.owner_id),
                job_title: Set(new.job_title.clone()),
                cv_doc_id: Set(new.cv_doc_id),
                project_doc_id: Set(new.project_doc_id),
                status: Set(JobStatus::Queued.as_str().to_string()),
                version: Set(1),
                retry_count: Set(0),
                error_message: Set(None),
                result: Set(None),
                created_at: Set(Utc::now().into()),
                processing_started_at: Set(None),
                processing_completed_at: Set(None),
            };

            match record.insert(self.pool.conn()).await {
                Ok(inserted) => return Ok(inserted),
                Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                    // Lost the insert race; back off and re-read.
                    let delay = CREATE_BACKOFF_MS * 2u64.pow(attempt);
                    tracing::debug!(
                        job_id = %new.job_id,
                        attempt = attempt + 1,
                        delay_ms = delay,
                        "Insert race on job_id, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.find_by_job_id(&new.job_id).await?.ok_or_else(|| {
            AppError::Persistence {
                message: format!("job {} not readable after insert retries", new.job_id),
            }
        })
    }

    async fn get(&self, job_id: &str) -> Result<Option<EvaluationJob>> {
        self.find_by_job_id(job_id).await
    }

    async fn find(&self, job_id: &str, owner_id: Uuid) -> Result<Option<EvaluationJob>> {
        EvaluationJobEntity::find()
            .filter(EvaluationJobColumn::JobId.eq(job_id))
            .filter(EvaluationJobColumn::OwnerId.eq(owner_id))
            .one(self.pool.conn())
            .await
            .map_err(Into::into)
    }

    async fn list(&self, owner_id: Uuid, query: &ListQuery) -> Result<JobPage> {
        let (page, limit) = query.normalized();

        let mut select = EvaluationJobEntity::find()
            .filter(EvaluationJobColumn::OwnerId.eq(owner_id));
        if let Some(status) = query.status {
            select = select.filter(EvaluationJobColumn::Status.eq(status.as_str()));
        }

        let paginator = select
            .order_by_desc(EvaluationJobColumn::CreatedAt)
            .paginate(self.pool.conn(), limit);

        let total = paginator.num_items().await?;
        let jobs = paginator.fetch_page(page - 1).await?;

        Ok(JobPage::new(jobs, page, limit, total))
    }

    async fn update_optimistic(
        &self,
        job_id: &str,
        expected_version: i32,
        patch: JobPatch,
    ) -> Result<EvaluationJob> {
        let mut update = EvaluationJobEntity::update_many()
            .filter(EvaluationJobColumn::JobId.eq(job_id))
            .filter(EvaluationJobColumn::Version.eq(expected_version))
            .col_expr(
                EvaluationJobColumn::Version,
                Expr::col(EvaluationJobColumn::Version).add(1),
            );

        if let Some(status) = patch.status {
            update = update.col_expr(EvaluationJobColumn::Status, Expr::value(status.as_str()));
        }
        if let Some(message) = patch.error_message {
            update = update.col_expr(EvaluationJobColumn::ErrorMessage, Expr::value(message));
        }
        if let Some(result) = patch.result {
            update = update.col_expr(EvaluationJobColumn::Result, Expr::value(result));
        }
        if patch.increment_retry {
            update = update.col_expr(
                EvaluationJobColumn::RetryCount,
                Expr::col(EvaluationJobColumn::RetryCount).add(1),
            );
        }
        if let Some(at) = patch.processing_started_at {
            update = update.col_expr(
                EvaluationJobColumn::ProcessingStartedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(at)),
            );
        }
        if let Some(at) = patch.processing_completed_at {
            update = update.col_expr(
                EvaluationJobColumn::ProcessingCompletedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(at)),
            );
        }

        let outcome = update.exec(self.pool.conn()).await?;

        if outcome.rows_affected == 0 {
            // Distinguish a missing record from a stale version.
            return match self.find_by_job_id(job_id).await? {
                None => Err(AppError::JobNotFound { id: job_id.into() }),
                Some(_) => Err(AppError::Concurrency {
                    job_id: job_id.into(),
                    attempts: 1,
                }),
            };
        }

        self.find_by_job_id(job_id)
            .await?
            .ok_or_else(|| AppError::JobNotFound { id: job_id.into() })
    }
}
