//! HireLens Evaluation Worker
//!
//! Drains the evaluation queue and drives the engine:
//! 1. Receives a task from the queue
//! 2. Transitions the job to processing
//! 3. Runs the retrieval-augmented scoring chain
//! 4. Writes the terminal status and result

use hirelens_eval_worker::processor::EvalProcessor;
use hirelens_common::{
    config::AppConfig,
    db::DbPool,
    jobs::PgJobStore,
    llm::HttpLlmClient,
    queue::{SqsTaskQueue, TaskQueue},
    VERSION,
};
use hirelens_engine::{EngineConfig, EvaluationEngine};
use hirelens_retrieval::{PgVectorStore, RetrievalIndex};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize tracing
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.observability.log_level.clone().into()),
        )
        .with_target(true);
    if config.observability.json_logging {
        fmt.json().init();
    } else {
        fmt.init();
    }

    info!("Starting HireLens Evaluation Worker v{}", VERSION);

    hirelens_common::metrics::register_metrics();

    let config = Arc::new(config);

    // Storage
    let db = DbPool::new(&config.database).await?;
    let store = Arc::new(PgJobStore::new(db.clone()));

    // LLM backend (also serves as the embedder)
    let llm = Arc::new(HttpLlmClient::connect(&config.llm).await?);
    info!(provider = llm.provider().name(), "LLM client initialized");

    // Retrieval index
    let retrieval = Arc::new(RetrievalIndex::new(
        Arc::new(PgVectorStore::new(db.clone())),
        llm.clone(),
        &config.retrieval,
    ));

    // Engine and processor
    let engine = Arc::new(EvaluationEngine::new(
        llm,
        retrieval,
        EngineConfig::from_app(&config),
    ));
    let processor = Arc::new(EvalProcessor::new(store, engine));

    // Queue
    if config.queue.evaluation_queue_url.is_none() {
        warn!("queue.evaluation_queue_url not set, waiting for shutdown signal...");
        tokio::signal::ctrl_c().await?;
        info!("Evaluation worker shutting down");
        return Ok(());
    }
    let queue: Arc<dyn TaskQueue> = Arc::new(SqsTaskQueue::connect(&config.queue).await?);

    // Worker pool with graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::with_capacity(config.worker.pool_size);

    info!(pool_size = config.worker.pool_size, "Worker pool starting");
    for worker_id in 0..config.worker.pool_size {
        handles.push(tokio::spawn(worker_loop(
            worker_id,
            queue.clone(),
            processor.clone(),
            config.clone(),
            shutdown_rx.clone(),
        )));
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining workers...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        let _ = handle.await;
    }

    info!("Evaluation worker shutting down");
    Ok(())
}

/// One worker: poll, process, ack. A worker never leaves a job in
/// `processing` on its own account — panicking items are marked failed
/// before the next poll.
async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn TaskQueue>,
    processor: Arc<EvalProcessor>,
    config: Arc<AppConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut consecutive_failures: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        // Circuit breaker: pause after repeated failures
        if consecutive_failures >= config.worker.max_consecutive_failures {
            warn!(
                worker_id,
                failures = consecutive_failures,
                "Circuit breaker open, pausing..."
            );
            tokio::time::sleep(std::time::Duration::from_secs(
                config.worker.circuit_break_secs,
            ))
            .await;
            consecutive_failures = 0;
            info!(worker_id, "Circuit breaker reset, resuming...");
        }

        let delivery = tokio::select! {
            _ = shutdown.changed() => break,
            result = queue.dequeue() => match result {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(e) => {
                    consecutive_failures += 1;
                    error!(worker_id, error = %e, "Failed to receive from queue");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            },
        };

        let job_id = delivery.task.job_id.clone();
        info!(worker_id, job_id = %job_id, "Received evaluation task");

        // Run in a task so a panic is contained to this item
        let item_processor = processor.clone();
        let task = delivery.task.clone();
        let handle = tokio::spawn(async move { item_processor.process(&task).await });

        match handle.await {
            Ok(Ok(outcome)) => {
                consecutive_failures = 0;
                info!(worker_id, job_id = %job_id, ?outcome, "Task processed");
            }
            Ok(Err(e)) => {
                consecutive_failures += 1;
                error!(worker_id, job_id = %job_id, error = %e, "Task processing errored");
            }
            Err(join_err) => {
                consecutive_failures += 1;
                error!(worker_id, job_id = %job_id, error = %join_err, "Task panicked");
                processor
                    .mark_failed(&job_id, "internal error during evaluation")
                    .await;
            }
        }

        // Always ack: operator-visible failures must not spin through
        // queue-level redelivery.
        if let Err(e) = queue.ack(&delivery).await {
            error!(worker_id, job_id = %job_id, error = %e, "Failed to ack task");
        }
    }

    info!(worker_id, "Worker drained and stopped");
}
