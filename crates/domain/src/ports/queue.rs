use std::time::Duration;

use thiserror::Error;

use super::BoxFuture;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
    #[error("queue serialization error: {0}")]
    Serialization(String),
    #[error("queue operation failed: {0}")]
    Operation(String),
}

/// Durable at-least-once point-to-point queues, addressed by name. A
/// dequeued payload is parked on a processing list until `ack` removes it;
/// `requeue_processing` pushes parked payloads back for redelivery.
pub trait EventQueue: Send + Sync {
    fn publish(&self, queue: &str, payload: &str) -> BoxFuture<'_, Result<(), QueueError>>;
    /// A zero timeout polls without blocking.
    fn dequeue(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<String>, QueueError>>;
    fn ack(&self, queue: &str, payload: &str) -> BoxFuture<'_, Result<(), QueueError>>;
    fn requeue_processing(
        &self,
        queue: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<usize, QueueError>>;
}
