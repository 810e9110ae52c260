//! Metrics and observability utilities
//!
//! Prometheus-style counters and histograms with standardized naming.

use metrics::{describe_counter, describe_histogram, Unit};

/// Metrics prefix for all HireLens metrics
pub const METRICS_PREFIX: &str = "hirelens";

pub const JOBS_SUBMITTED: &str = "hirelens_jobs_submitted_total";
pub const JOBS_COMPLETED: &str = "hirelens_jobs_completed_total";
pub const JOBS_FAILED: &str = "hirelens_jobs_failed_total";
pub const JOBS_CANCELLED: &str = "hirelens_jobs_cancelled_total";
pub const EVALUATION_DURATION: &str = "hirelens_evaluation_duration_seconds";
pub const RETRIEVAL_EMPTY_RESULTS: &str = "hirelens_retrieval_empty_results_total";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        JOBS_SUBMITTED,
        Unit::Count,
        "Evaluation jobs accepted by the dispatcher"
    );
    describe_counter!(
        JOBS_COMPLETED,
        Unit::Count,
        "Evaluation jobs finished successfully"
    );
    describe_counter!(JOBS_FAILED, Unit::Count, "Evaluation jobs that failed");
    describe_counter!(
        JOBS_CANCELLED,
        Unit::Count,
        "Evaluation jobs cancelled by their owner"
    );
    describe_histogram!(
        EVALUATION_DURATION,
        Unit::Seconds,
        "End-to-end engine execution time per job"
    );
    describe_counter!(
        RETRIEVAL_EMPTY_RESULTS,
        Unit::Count,
        "Retrieval queries degraded to an empty context"
    );
}
