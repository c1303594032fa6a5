use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{AppError, Result};

use super::backend::{QueueBackend, QueueMessage};

#[derive(Debug)]
struct StoredMessage {
    id: i64,
    body: String,
    dequeue_count: u32,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: i64,
    messages: Vec<StoredMessage>,
}

/// Process-local queue. Messages are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(queue: &str) -> AppError {
    AppError::QueueTransport(format!("queue '{}' does not exist", queue))
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn create_if_not_exists(&self, queue: &str) -> Result<()> {
        let mut queues = self.queues.lock().await;
        queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn send(&self, queue: &str, body: &str) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue).ok_or_else(|| missing(queue))?;
        state.next_id += 1;
        let id = state.next_id;
        state.messages.push(StoredMessage {
            id,
            body: body.to_string(),
            dequeue_count: 0,
            visible_at: Instant::now(),
        });
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>> {
        let now = Instant::now();
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue).ok_or_else(|| missing(queue))?;

        let received = state
            .messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .take(max_messages)
            .map(|m| {
                m.dequeue_count += 1;
                m.visible_at = now + visibility_timeout;
                QueueMessage {
                    id: m.id,
                    body: m.body.clone(),
                    dequeue_count: m.dequeue_count,
                }
            })
            .collect();
        Ok(received)
    }

    async fn delete(&self, queue: &str, message_id: i64) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue).ok_or_else(|| missing(queue))?;
        state.messages.retain(|m| m.id != message_id);
        Ok(())
    }

    async fn approximate_count(&self, queue: &str) -> Result<u64> {
        let queues = self.queues.lock().await;
        let state = queues.get(queue).ok_or_else(|| missing(queue))?;
        Ok(state.messages.len() as u64)
    }
}
