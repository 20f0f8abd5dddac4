use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use redis::aio::ConnectionManager;
use relay_domain::ports::BoxFuture;
use relay_domain::ports::queue::{EventQueue, QueueError};

/// Redis-backed durable queue: a ready list fed by `LPUSH`, consumed with
/// `RPOPLPUSH` into a per-queue processing list. Payloads survive a consumer
/// crash on the processing list until `ack` (`LREM`) or
/// `requeue_processing` moves them.
#[derive(Clone)]
pub struct RedisEventQueue {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisEventQueue {
    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| QueueError::Unavailable(err.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| QueueError::Unavailable(err.to_string()))?;
        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn ready_key(&self, queue: &str) -> String {
        format!("{}:{queue}:ready", self.prefix)
    }

    fn processing_key(&self, queue: &str) -> String {
        format!("{}:{queue}:processing", self.prefix)
    }
}

impl EventQueue for RedisEventQueue {
    fn publish(&self, queue: &str, payload: &str) -> BoxFuture<'_, Result<(), QueueError>> {
        let ready_key = self.ready_key(queue);
        let payload = payload.to_string();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = redis::cmd("LPUSH")
                .arg(&ready_key)
                .arg(payload)
                .query_async(&mut conn)
                .await
                .map_err(|err| QueueError::Operation(err.to_string()))?;
            Ok(())
        })
    }

    fn dequeue(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<String>, QueueError>> {
        let ready_key = self.ready_key(queue);
        let processing_key = self.processing_key(queue);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let payload: Option<String> = if timeout.is_zero() {
                redis::cmd("RPOPLPUSH")
                    .arg(&ready_key)
                    .arg(&processing_key)
                    .query_async(&mut conn)
                    .await
                    .map_err(|err| QueueError::Operation(err.to_string()))?
            } else {
                redis::cmd("BRPOPLPUSH")
                    .arg(&ready_key)
                    .arg(&processing_key)
                    .arg(timeout.as_secs().max(1) as usize)
                    .query_async(&mut conn)
                    .await
                    .map_err(|err| QueueError::Operation(err.to_string()))?
            };
            Ok(payload)
        })
    }

    fn ack(&self, queue: &str, payload: &str) -> BoxFuture<'_, Result<(), QueueError>> {
        let processing_key = self.processing_key(queue);
        let payload = payload.to_string();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = redis::cmd("LREM")
                .arg(&processing_key)
                .arg(1)
                .arg(payload)
                .query_async(&mut conn)
                .await
                .map_err(|err| QueueError::Operation(err.to_string()))?;
            Ok(())
        })
    }

    fn requeue_processing(
        &self,
        queue: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<usize, QueueError>> {
        let ready_key = self.ready_key(queue);
        let processing_key = self.processing_key(queue);
        Box::pin(async move {
            if limit == 0 {
                return Ok(0);
            }
            let mut conn = self.manager.clone();
            let payloads: Vec<String> = redis::cmd("LRANGE")
                .arg(&processing_key)
                .arg(0)
                .arg((limit.saturating_sub(1)) as i64)
                .query_async(&mut conn)
                .await
                .map_err(|err| QueueError::Operation(err.to_string()))?;
            if payloads.is_empty() {
                return Ok(0);
            }
            let _: i64 = redis::cmd("RPUSH")
                .arg(&ready_key)
                .arg(payloads.clone())
                .query_async(&mut conn)
                .await
                .map_err(|err| QueueError::Operation(err.to_string()))?;
            let _: String = redis::cmd("LTRIM")
                .arg(&processing_key)
                .arg(payloads.len() as i64)
                .arg(-1)
                .query_async(&mut conn)
                .await
                .map_err(|err| QueueError::Operation(err.to_string()))?;
            Ok(payloads.len())
        })
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<String>,
    processing: Vec<String>,
}

/// Same ready/processing shape as the Redis queue, for single-process runs
/// and tests. The dequeue timeout is ignored: an empty queue reports `None`
/// immediately.
#[derive(Clone, Default)]
pub struct MemoryEventQueue {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
}

impl MemoryEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depths(&self, queue: &str) -> (usize, usize) {
        let queues = self.queues.lock().unwrap();
        queues
            .get(queue)
            .map(|state| (state.ready.len(), state.processing.len()))
            .unwrap_or((0, 0))
    }
}

impl EventQueue for MemoryEventQueue {
    fn publish(&self, queue: &str, payload: &str) -> BoxFuture<'_, Result<(), QueueError>> {
        let queue = queue.to_string();
        let payload = payload.to_string();
        let queues = self.queues.clone();
        Box::pin(async move {
            queues
                .lock()
                .unwrap()
                .entry(queue)
                .or_default()
                .ready
                .push_back(payload);
            Ok(())
        })
    }

    fn dequeue(
        &self,
        queue: &str,
        _timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<String>, QueueError>> {
        let queue = queue.to_string();
        let queues = self.queues.clone();
        Box::pin(async move {
            let mut queues = queues.lock().unwrap();
            let state = queues.entry(queue).or_default();
            let payload = state.ready.pop_front();
            if let Some(payload) = payload.clone() {
                state.processing.push(payload);
            }
            Ok(payload)
        })
    }

    fn ack(&self, queue: &str, payload: &str) -> BoxFuture<'_, Result<(), QueueError>> {
        let queue = queue.to_string();
        let payload = payload.to_string();
        let queues = self.queues.clone();
        Box::pin(async move {
            let mut queues = queues.lock().unwrap();
            if let Some(state) = queues.get_mut(&queue) {
                if let Some(position) = state.processing.iter().position(|item| item == &payload) {
                    state.processing.remove(position);
                }
            }
            Ok(())
        })
    }

    fn requeue_processing(
        &self,
        queue: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<usize, QueueError>> {
        let queue = queue.to_string();
        let queues = self.queues.clone();
        Box::pin(async move {
            let mut queues = queues.lock().unwrap();
            let Some(state) = queues.get_mut(&queue) else {
                return Ok(0);
            };
            let take = limit.min(state.processing.len());
            for payload in state.processing.drain(..take) {
                state.ready.push_back(payload);
            }
            Ok(take)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUEUE: &str = "chat_creation_queue";

    #[tokio::test]
    async fn dequeue_parks_payloads_until_ack() {
        let queue = MemoryEventQueue::new();
        queue.publish(QUEUE, "a").await.unwrap();
        queue.publish(QUEUE, "b").await.unwrap();

        let first = queue.dequeue(QUEUE, Duration::ZERO).await.unwrap();
        assert_eq!(first.as_deref(), Some("a"));
        assert_eq!(queue.depths(QUEUE), (1, 1));

        queue.ack(QUEUE, "a").await.unwrap();
        assert_eq!(queue.depths(QUEUE), (1, 0));
    }

    #[tokio::test]
    async fn empty_queue_polls_none() {
        let queue = MemoryEventQueue::new();
        assert_eq!(queue.dequeue(QUEUE, Duration::ZERO).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unacked_payloads_can_be_requeued() {
        let queue = MemoryEventQueue::new();
        queue.publish(QUEUE, "a").await.unwrap();
        queue.publish(QUEUE, "b").await.unwrap();
        queue.dequeue(QUEUE, Duration::ZERO).await.unwrap();
        queue.dequeue(QUEUE, Duration::ZERO).await.unwrap();
        assert_eq!(queue.depths(QUEUE), (0, 2));

        let moved = queue.requeue_processing(QUEUE, 10).await.unwrap();
        assert_eq!(moved, 2);
        assert_eq!(queue.depths(QUEUE), (2, 0));
        assert_eq!(
            queue.dequeue(QUEUE, Duration::ZERO).await.unwrap().as_deref(),
            Some("a")
        );
    }

    #[tokio::test]
    async fn queues_are_isolated_by_name() {
        let queue = MemoryEventQueue::new();
        queue.publish("one", "a").await.unwrap();
        assert_eq!(queue.dequeue("two", Duration::ZERO).await.unwrap(), None);
    }
}
