//! Evaluation job entity for async processing

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Job status enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => JobStatus::Queued,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Queued,
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// ```text
    /// queued ──► processing ──► completed
    ///    │          │
    ///    │          └────────► failed
    ///    ├── cancelled (only from queued|processing)
    /// ```
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Processing) => true,
            (JobStatus::Queued, JobStatus::Cancelled) => true,
            (JobStatus::Queued, JobStatus::Failed) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            (JobStatus::Processing, JobStatus::Failed) => true,
            (JobStatus::Processing, JobStatus::Cancelled) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "evaluation_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Public identifier ("eval_<base36 ms>_<12 hex>"), unique secondary index
    #[sea_orm(column_type = "Text", unique)]
    pub job_id: String,

    pub owner_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub job_title: String,

    pub cv_doc_id: Uuid,

    pub project_doc_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// Monotonic, incremented on every mutation
    pub version: i32,

    /// Worker-level retries of the whole job
    pub retry_count: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub result: Option<Json>,

    pub created_at: DateTimeWithTimeZone,

    pub processing_started_at: Option<DateTimeWithTimeZone>,

    pub processing_completed_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Get the job status as an enum
    pub fn job_status(&self) -> JobStatus {
        JobStatus::from(self.status.clone())
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.job_status().is_terminal()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
