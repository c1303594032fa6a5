use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

use crate::db::format_datetime;
use crate::error::{AppError, Result};

use super::backend::{QueueBackend, QueueMessage};

/// Durable queue stored in the application database.
#[derive(Clone)]
pub struct SqliteQueue {
    conn: Connection,
}

impl SqliteQueue {
    /// Expects a connection whose schema was created by `Repository::new`.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

fn missing(queue: &str) -> AppError {
    AppError::QueueTransport(format!("queue '{}' does not exist", queue))
}

#[async_trait]
impl QueueBackend for SqliteQueue {
    async fn create_if_not_exists(&self, queue: &str) -> Result<()> {
        let queue = queue.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO queues (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
                    params![queue, format_datetime(Utc::now())],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| AppError::QueueTransport(e.to_string()))
    }

    async fn send(&self, queue: &str, body: &str) -> Result<()> {
        let queue_name = queue.to_string();
        let body = body.to_string();
        let inserted = self
            .conn
            .call(move |conn| {
                let exists: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM queues WHERE name = ?1",
                        params![queue_name],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Ok(false);
                }
                let now = format_datetime(Utc::now());
                conn.execute(
                    r#"INSERT INTO queue_messages (queue_name, body, visible_at, enqueued_at)
                       VALUES (?1, ?2, ?3, ?3)"#,
                    params![queue_name, body, now],
                )?;
                Ok(true)
            })
            .await
            .map_err(|e| AppError::QueueTransport(e.to_string()))?;

        if inserted {
            Ok(())
        } else {
            Err(missing(queue))
        }
    }

    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>> {
        let queue = queue.to_string();
        let hide_for = chrono::Duration::from_std(visibility_timeout)
            .map_err(|e| AppError::Config(e.to_string()))?;

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let now = Utc::now();
                let mut received = Vec::new();
                {
                    let mut stmt = tx.prepare(
                        r#"SELECT id, body, dequeue_count FROM queue_messages
                           WHERE queue_name = ?1 AND visible_at <= ?2
                           ORDER BY id
                           LIMIT ?3"#,
                    )?;
                    let rows = stmt
                        .query_map(
                            params![queue, format_datetime(now), max_messages as i64],
                            |row| {
                                Ok(QueueMessage {
                                    id: row.get(0)?,
                                    body: row.get(1)?,
                                    dequeue_count: row.get::<_, u32>(2)? + 1,
                                })
                            },
                        )?
                        .collect::<std::result::Result<Vec<_>, _>>()?;

                    let visible_at = format_datetime(now + hide_for);
                    for message in rows {
                        tx.execute(
                            "UPDATE queue_messages SET dequeue_count = ?1, visible_at = ?2 WHERE id = ?3",
                            params![message.dequeue_count, visible_at, message.id],
                        )?;
                        received.push(message);
                    }
                }
                tx.commit()?;
                Ok(received)
            })
            .await
            .map_err(|e| AppError::QueueTransport(e.to_string()))
    }

    async fn delete(&self, queue: &str, message_id: i64) -> Result<()> {
        let queue = queue.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM queue_messages WHERE queue_name = ?1 AND id = ?2",
                    params![queue, message_id],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| AppError::QueueTransport(e.to_string()))
    }

    async fn approximate_count(&self, queue: &str) -> Result<u64> {
        let queue_name = queue.to_string();
        let count = self
            .conn
            .call(move |conn| {
                let exists: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM queues WHERE name = ?1",
                        params![queue_name],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Ok(None);
                }
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM queue_messages WHERE queue_name = ?1",
                    params![queue_name],
                    |row| row.get(0),
                )?;
                Ok(Some(count as u64))
            })
            .await
            .map_err(|e| AppError::QueueTransport(e.to_string()))?;

        count.ok_or_else(|| missing(queue))
    }
}
