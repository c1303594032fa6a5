use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::QueueSettings;
use crate::error::{AppError, Result};
use crate::models::SummarizationJob;

use super::backend::{QueueBackend, QueueMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-indexed): `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl From<&QueueSettings> for RetryPolicy {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
        }
    }
}

/// Summary job queue on top of a `QueueBackend`.
pub struct JobQueue {
    backend: Arc<dyn QueueBackend>,
    queue_name: String,
    retry: RetryPolicy,
}

impl JobQueue {
    pub fn new(backend: Arc<dyn QueueBackend>, queue_name: String, retry: RetryPolicy) -> Self {
        Self {
            backend,
            queue_name,
            retry,
        }
    }

    pub fn name(&self) -> &str {
        &self.queue_name
    }

    async fn send_once(&self, payload: &str) -> Result<()> {
        self.backend.create_if_not_exists(&self.queue_name).await?;
        self.backend.send(&self.queue_name, payload).await
    }

    /// Deliver `job`, retrying transport failures with exponential backoff.
    ///
    /// Fails with `QueueUnavailable` carrying the last error once all
    /// attempts are used. There is no wait after the final attempt.
    pub async fn enqueue_with_retry(&self, job: &SummarizationJob) -> Result<()> {
        let payload = job.encode()?;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.send_once(&payload).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(post_id = job.post_id, attempt, "summary job enqueued after retry");
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        post_id = job.post_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "failed to enqueue summary job"
                    );
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
            }
        }

        Err(AppError::QueueUnavailable {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Approximate number of messages in `queue_name`; 0 if it cannot be read.
    pub async fn queue_depth(&self, queue_name: &str) -> u64 {
        match self.backend.approximate_count(queue_name).await {
            Ok(count) => count,
            Err(e) => {
                error!(queue = queue_name, error = %e, "failed to read queue depth");
                0
            }
        }
    }

    pub async fn receive(&self, max_messages: usize, visibility_timeout: Duration) -> Result<Vec<QueueMessage>> {
        self.backend.create_if_not_exists(&self.queue_name).await?;
        self.backend
            .receive(&self.queue_name, max_messages, visibility_timeout)
            .await
    }

    pub async fn ack(&self, message: &QueueMessage) -> Result<()> {
        self.backend.delete(&self.queue_name, message.id).await
    }
}
