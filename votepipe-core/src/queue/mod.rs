//! Durable FIFO queue of serialized submissions.
//!
//! Producers append to the tail, the worker pops from the head. There is no
//! queue-side transaction: an entry is gone once popped.

use async_trait::async_trait;

use crate::{error::QueueError, link::Connection};

pub mod memory;
pub mod redis;

pub use memory::MemoryQueue;
pub use self::redis::RedisQueue;

/// Fixed name of the list holding queue entries.
pub const DEFAULT_QUEUE_KEY: &str = "votes";

#[async_trait]
pub trait QueueConnection: Connection {
    /// Non-blocking pop from the head; `None` when the queue is empty.
    async fn pop(&mut self) -> Result<Option<Vec<u8>>, QueueError>;

    /// Append one entry to the tail.
    async fn push(&mut self, payload: &[u8]) -> Result<(), QueueError>;

    /// Cheap round trip used to detect silently dropped connections.
    async fn ping(&mut self) -> Result<(), QueueError>;
}
