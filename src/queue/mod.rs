mod backend;
mod client;
mod memory;
mod sqlite;

pub use backend::{QueueBackend, QueueMessage};
pub use client::{JobQueue, RetryPolicy};
pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

#[cfg(test)]
pub use backend::testing;
