//! Evaluation worker processor
//!
//! Drives one queued task through the engine and the job state
//! machine. Duplicate deliveries and cancellations are resolved by
//! status checks before any terminal write.

use hirelens_common::db::models::JobStatus;
use hirelens_common::errors::{AppError, Result};
use hirelens_common::jobs::{transition_status, JobStore, TransitionExtras};
use hirelens_common::queue::EvaluationTask;
use hirelens_engine::{EvaluationEngine, EvaluationInput};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Delay before the second attempt at a terminal write
const TERMINAL_RETRY_DELAY: Duration = Duration::from_millis(500);

/// What happened to a delivered task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Failed,
    /// Duplicate delivery, cancellation, or a vanished job; nothing written
    Skipped,
}

pub struct EvalProcessor {
    store: Arc<dyn JobStore>,
    engine: Arc<EvaluationEngine>,
}

impl EvalProcessor {
    pub fn new(store: Arc<dyn JobStore>, engine: Arc<EvaluationEngine>) -> Self {
        Self { store, engine }
    }

    /// Process one task end to end
    #[instrument(skip(self, task), fields(job_id = %task.job_id))]
    pub async fn process(&self, task: &EvaluationTask) -> Result<ProcessOutcome> {
        let Some(job) = self.store.get(&task.job_id).await? else {
            warn!("Task references an unknown job, skipping");
            return Ok(ProcessOutcome::Skipped);
        };

        match job.job_status() {
            JobStatus::Cancelled => {
                info!("Job was cancelled before processing, skipping");
                return Ok(ProcessOutcome::Skipped);
            }
            JobStatus::Completed | JobStatus::Failed => {
                info!("Job already terminal, skipping duplicate delivery");
                return Ok(ProcessOutcome::Skipped);
            }
            JobStatus::Queued => {
                match transition_status(
                    self.store.as_ref(),
                    &task.job_id,
                    JobStatus::Processing,
                    TransitionExtras::default(),
                )
                .await
                {
                    Ok(_) => {}
                    Err(AppError::InvalidTransition { .. }) => {
                        // Another worker claimed it first.
                        info!("Lost the claim race, skipping");
                        return Ok(ProcessOutcome::Skipped);
                    }
                    Err(e) => return Err(e),
                }
            }
            // A redelivery of a job stuck in processing: run it again,
            // the terminal CAS resolves whoever finishes first.
            JobStatus::Processing => {
                info!("Re-processing a job already marked processing");
            }
        }

        let input = EvaluationInput {
            job_id: task.job_id.clone(),
            owner_id: task.owner_id,
            job_title: task.job_title.clone(),
            cv_text: task.cv_text.clone(),
            project_text: task.project_text.clone(),
        };

        let started = Instant::now();
        let outcome = self.engine.evaluate(&input).await;
        metrics::histogram!(hirelens_common::metrics::EVALUATION_DURATION)
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(result) => {
                let payload = serde_json::to_value(&result)?;
                let extras = TransitionExtras {
                    result: Some(payload),
                    ..Default::default()
                };
                if self
                    .finish(&task.job_id, JobStatus::Completed, extras)
                    .await
                {
                    metrics::counter!(hirelens_common::metrics::JOBS_COMPLETED).increment(1);
                    info!(
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Evaluation completed"
                    );
                    Ok(ProcessOutcome::Completed)
                } else {
                    Ok(ProcessOutcome::Skipped)
                }
            }
            Err(engine_err) => {
                let app_err: AppError = engine_err.into();
                let extras = TransitionExtras {
                    error_message: Some(app_err.job_message()),
                    increment_retry: true,
                    ..Default::default()
                };
                if self.finish(&task.job_id, JobStatus::Failed, extras).await {
                    metrics::counter!(hirelens_common::metrics::JOBS_FAILED).increment(1);
                    warn!(error = %app_err, "Evaluation failed");
                    Ok(ProcessOutcome::Failed)
                } else {
                    Ok(ProcessOutcome::Skipped)
                }
            }
        }
    }

    /// Mark a job failed outside the normal flow (panicked task)
    pub async fn mark_failed(&self, job_id: &str, message: &str) {
        let extras = TransitionExtras {
            error_message: Some(message.to_string()),
            increment_retry: true,
            ..Default::default()
        };
        if self.finish(job_id, JobStatus::Failed, extras).await {
            metrics::counter!(hirelens_common::metrics::JOBS_FAILED).increment(1);
        }
    }

    /// Write a terminal status, honoring cancellation observed after
    /// the engine ran. Returns whether the write landed.
    ///
    /// Persistence and concurrency failures get one best-effort second
    /// attempt after a short delay; after that the job is left in
    /// `processing` for operations to surface as stuck.
    async fn finish(&self, job_id: &str, status: JobStatus, extras: TransitionExtras) -> bool {
        for attempt in 0..2 {
            match self.store.get(job_id).await {
                Ok(Some(current)) if current.job_status() == JobStatus::Cancelled => {
                    info!(job_id, "Job cancelled during processing, skipping terminal write");
                    return false;
                }
                Ok(Some(current)) if current.is_terminal() => {
                    info!(
                        job_id,
                        status = current.status,
                        "Job already terminal, skipping duplicate terminal write"
                    );
                    return false;
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(job_id, "Job vanished before terminal write");
                    return false;
                }
                Err(e) => {
                    error!(job_id, error = %e, "Failed to read job before terminal write");
                    if attempt == 0 {
                        tokio::time::sleep(TERMINAL_RETRY_DELAY).await;
                        continue;
                    }
                    return false;
                }
            }

            match transition_status(self.store.as_ref(), job_id, status, extras.clone()).await {
                Ok(_) => return true,
                Err(AppError::InvalidTransition { .. }) => {
                    // Raced with a cancel or another terminal writer.
                    info!(job_id, "Terminal write lost a race, skipping");
                    return false;
                }
                Err(e) if attempt == 0 => {
                    warn!(job_id, error = %e, "Terminal write failed, retrying once");
                    tokio::time::sleep(TERMINAL_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!(
                        job_id,
                        error = %e,
                        "Terminal write failed twice, leaving job in processing"
                    );
                    return false;
                }
            }
        }
        false
    }
}
