use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A message handed out by `receive`. It stays invisible to other receivers
/// until the visibility timeout passes, after which it is delivered again
/// unless deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: i64,
    pub body: String,
    /// Deliveries so far, including this one.
    pub dequeue_count: u32,
}

/// Named queues of opaque string payloads with at-least-once delivery.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Creates the queue if missing; a no-op otherwise.
    async fn create_if_not_exists(&self, queue: &str) -> Result<()>;

    async fn send(&self, queue: &str, body: &str) -> Result<()>;

    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>>;

    /// Acknowledges a received message.
    async fn delete(&self, queue: &str, message_id: i64) -> Result<()>;

    async fn approximate_count(&self, queue: &str) -> Result<u64>;
}
