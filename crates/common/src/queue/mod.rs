//! Evaluation task queue
//!
//! Durable FIFO with at-least-once delivery:
//! - `TaskQueue` trait consumed by the dispatcher and the worker pool
//! - SQS implementation with retry on enqueue
//! - In-memory implementation for tests and single-process deployments

use crate::config::QueueConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use backoff::{future::retry, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

/// Work item carried from the dispatcher to a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationTask {
    pub job_id: String,
    pub record_id: Uuid,
    pub owner_id: Uuid,
    pub job_title: String,
    pub cv_text: String,
    pub project_text: String,
}

/// A dequeued task plus the receipt needed to ack or nack it
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task: EvaluationTask,
    pub receipt: String,
}

/// Durable FIFO with at-least-once delivery
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a work item
    async fn enqueue(&self, task: &EvaluationTask) -> Result<()>;

    /// Long-poll for the next item; `None` when the poll window elapses
    async fn dequeue(&self) -> Result<Option<Delivery>>;

    /// Acknowledge a processed item (removes it permanently)
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Return an item for redelivery
    async fn nack(&self, delivery: &Delivery) -> Result<()>;
}

/// SQS-backed task queue
pub struct SqsTaskQueue {
    client: SqsClient,
    url: String,
    poll_timeout_secs: i32,
    visibility_timeout_secs: i32,
}

impl SqsTaskQueue {
    /// Connect using the ambient AWS configuration
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        let url = config
            .evaluation_queue_url
            .clone()
            .ok_or_else(|| AppError::Configuration {
                message: "queue.evaluation_queue_url is not set".into(),
            })?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = SqsClient::new(&aws_config);

        Ok(Self {
            client,
            url,
            poll_timeout_secs: config.poll_timeout_secs as i32,
            visibility_timeout_secs: config.visibility_timeout_secs as i32,
        })
    }

    pub fn with_client(client: SqsClient, url: String, config: &QueueConfig) -> Self {
        Self {
            client,
            url,
            poll_timeout_secs: config.poll_timeout_secs as i32,
            visibility_timeout_secs: config.visibility_timeout_secs as i32,
        }
    }
}

#[async_trait]
impl TaskQueue for SqsTaskQueue {
    async fn enqueue(&self, task: &EvaluationTask) -> Result<()> {
        let body = serde_json::to_string(task)?;

        // Transient SQS hiccups are retried with exponential backoff;
        // the dispatcher treats a final failure as fatal for the job.
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(10)),
            ..Default::default()
        };

        let message_id = retry(backoff, || async {
            self.client
                .send_message()
                .queue_url(&self.url)
                .message_body(&body)
                .send()
                .await
                .map(|out| out.message_id.unwrap_or_default())
                .map_err(|e| {
                    backoff::Error::transient(AppError::QueueError {
                        message: format!("Failed to send message: {}", e),
                    })
                })
        })
        .await?;

        debug!(job_id = %task.job_id, message_id = %message_id, "Task enqueued");
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Delivery>> {
        let result = self
            .client
            .receive_message()
            .queue_url(&self.url)
            .max_number_of_messages(1)
            .visibility_timeout(self.visibility_timeout_secs)
            .wait_time_seconds(self.poll_timeout_secs)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to receive messages: {}", e),
            })?;

        let Some(message) = result.messages.unwrap_or_default().into_iter().next() else {
            return Ok(None);
        };

        let receipt = message
            .receipt_handle
            .ok_or_else(|| AppError::QueueError {
                message: "Message has no receipt handle".into(),
            })?;
        let body = message.body.ok_or_else(|| AppError::QueueError {
            message: "Message has no body".into(),
        })?;
        let task: EvaluationTask =
            serde_json::from_str(&body).map_err(|e| AppError::QueueError {
                message: format!("Failed to parse message: {}", e),
            })?;

        debug!(job_id = %task.job_id, "Task dequeued");
        Ok(Some(Delivery { task, receipt }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.url)
            .receipt_handle(&delivery.receipt)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to delete message: {}", e),
            })?;

        debug!(job_id = %delivery.task.job_id, "Task acked");
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<()> {
        // Zero visibility timeout puts the message straight back.
        self.client
            .change_message_visibility()
            .queue_url(&self.url)
            .receipt_handle(&delivery.receipt)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to return message: {}", e),
            })?;

        debug!(job_id = %delivery.task.job_id, "Task nacked");
        Ok(())
    }
}

/// In-memory task queue with at-least-once semantics
pub struct MemoryTaskQueue {
    state: Mutex<MemoryQueueState>,
    notify: Notify,
    poll_timeout: Duration,
}

#[derive(Default)]
struct MemoryQueueState {
    ready: VecDeque<EvaluationTask>,
    in_flight: HashMap<String, EvaluationTask>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::with_poll_timeout(Duration::from_millis(100))
    }

    pub fn with_poll_timeout(poll_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryQueueState::default()),
            notify: Notify::new(),
            poll_timeout,
        }
    }

    /// Tasks currently waiting or in flight (test helper)
    pub fn depth(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.ready.len() + state.in_flight.len()
    }
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: &EvaluationTask) -> Result<()> {
        self.state.lock().unwrap().ready.push_back(task.clone());
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + self.poll_timeout;
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(task) = state.ready.pop_front() {
                    let receipt = Uuid::new_v4().to_string();
                    state.in_flight.insert(receipt.clone(), task.clone());
                    return Ok(Some(Delivery { task, receipt }));
                }
            }

            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.state.lock().unwrap().in_flight.remove(&delivery.receipt);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(task) = state.in_flight.remove(&delivery.receipt) {
            state.ready.push_back(task);
            self.notify.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(job_id: &str) -> EvaluationTask {
        EvaluationTask {
            job_id: job_id.into(),
            record_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            job_title: "Backend Engineer".into(),
            cv_text: "cv".into(),
            project_text: "project".into(),
        }
    }

    #[test]
    fn test_task_serialization_roundtrip() {
        let msg = task("eval_q_1");
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: EvaluationTask = serde_json::from_str(&json).unwrap();
        assert_eq!(msg.job_id, parsed.job_id);
        assert_eq!(msg.record_id, parsed.record_id);
    }

    #[tokio::test]
    async fn test_memory_queue_fifo_and_ack() {
        let queue = MemoryTaskQueue::new();
        queue.enqueue(&task("eval_q_1")).await.unwrap();
        queue.enqueue(&task("eval_q_2")).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.task.job_id, "eval_q_1");
        queue.ack(&first).await.unwrap();

        let second = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(second.task.job_id, "eval_q_2");
        queue.ack(&second).await.unwrap();

        assert_eq!(queue.depth(), 0);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_queue_nack_redelivers() {
        let queue = MemoryTaskQueue::new();
        queue.enqueue(&task("eval_q_3")).await.unwrap();

        let delivery = queue.dequeue().await.unwrap().unwrap();
        queue.nack(&delivery).await.unwrap();

        let redelivered = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(redelivered.task.job_id, "eval_q_3");
    }
}
