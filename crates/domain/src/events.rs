use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::ports::queue::EventQueue;
use crate::ports::search::SearchDoc;

/// Counter maintenance for chat creation; payload is the application token.
pub const CHAT_CREATION_QUEUE: &str = "chat_creation_queue";
/// Counter maintenance for message creation; payload is a
/// [`MessageCreatedEvent`].
pub const MESSAGE_CREATION_QUEUE: &str = "message_creation_queue";
/// Search projection feed; same envelope, consumed by the indexer at its own
/// pace.
pub const SEARCH_INDEX_QUEUE: &str = "search_index_queue";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageCreatedEvent {
    pub id: i64,
    pub number: i64,
    pub body: String,
    pub chat_id: i64,
    pub chat_number: i64,
    pub application_id: i64,
    pub application_token: String,
    pub created_at_ms: i64,
}

impl MessageCreatedEvent {
    pub fn from_message(message: &Message, application_token: &str, chat_number: i64) -> Self {
        Self {
            id: message.id,
            number: message.number,
            body: message.body.clone(),
            chat_id: message.chat_id,
            chat_number,
            application_id: message.application_id,
            application_token: application_token.to_string(),
            created_at_ms: message.created_at_ms,
        }
    }

    pub fn search_doc(&self) -> SearchDoc {
        SearchDoc {
            id: self.id,
            number: self.number,
            body: self.body.clone(),
            chat_id: self.chat_id,
            created_at_ms: self.created_at_ms,
        }
    }
}

/// Fire-and-forget producer side of the aggregation pipeline. A failed
/// publish is logged and the request proceeds: counter freshness is traded
/// for availability.
#[derive(Clone)]
pub struct EventPublisher {
    queue: Arc<dyn EventQueue>,
}

impl EventPublisher {
    pub fn new(queue: Arc<dyn EventQueue>) -> Self {
        Self { queue }
    }

    pub async fn publish_chat_created(&self, application_token: &str) {
        let payload = match serde_json::to_string(application_token) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize chat creation event");
                return;
            }
        };
        if let Err(err) = self.queue.publish(CHAT_CREATION_QUEUE, &payload).await {
            tracing::warn!(
                error = %err,
                application_token,
                "failed to publish chat creation event"
            );
        }
    }

    pub async fn publish_message_created(&self, event: &MessageCreatedEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize message creation event");
                return;
            }
        };
        for queue in [MESSAGE_CREATION_QUEUE, SEARCH_INDEX_QUEUE] {
            if let Err(err) = self.queue.publish(queue, &payload).await {
                tracing::warn!(
                    error = %err,
                    queue,
                    message_id = event.id,
                    "failed to publish message creation event"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::ports::BoxFuture;
    use crate::ports::queue::QueueError;

    #[derive(Default)]
    struct FlakyQueue {
        fail: bool,
        published: Mutex<Vec<(String, String)>>,
    }

    impl EventQueue for FlakyQueue {
        fn publish(&self, queue: &str, payload: &str) -> BoxFuture<'_, Result<(), QueueError>> {
            let queue = queue.to_string();
            let payload = payload.to_string();
            Box::pin(async move {
                if self.fail {
                    return Err(QueueError::Unavailable("broker down".into()));
                }
                self.published.lock().unwrap().push((queue, payload));
                Ok(())
            })
        }

        fn dequeue(
            &self,
            _queue: &str,
            _timeout: Duration,
        ) -> BoxFuture<'_, Result<Option<String>, QueueError>> {
            Box::pin(async move { Ok(None) })
        }

        fn ack(&self, _queue: &str, _payload: &str) -> BoxFuture<'_, Result<(), QueueError>> {
            Box::pin(async move { Ok(()) })
        }

        fn requeue_processing(
            &self,
            _queue: &str,
            _limit: usize,
        ) -> BoxFuture<'_, Result<usize, QueueError>> {
            Box::pin(async move { Ok(0) })
        }
    }

    #[tokio::test]
    async fn message_events_fan_out_to_count_and_index_queues() {
        let queue = Arc::new(FlakyQueue::default());
        let publisher = EventPublisher::new(queue.clone());
        let event = MessageCreatedEvent {
            id: 1,
            number: 1,
            body: "hi".to_string(),
            chat_id: 9,
            chat_number: 2,
            application_id: 4,
            application_token: "tok".to_string(),
            created_at_ms: 1_000,
        };

        publisher.publish_message_created(&event).await;

        let published = queue.published.lock().unwrap();
        let queues: Vec<&str> = published.iter().map(|(queue, _)| queue.as_str()).collect();
        assert_eq!(queues, vec![MESSAGE_CREATION_QUEUE, SEARCH_INDEX_QUEUE]);
        let decoded: MessageCreatedEvent = serde_json::from_str(&published[0].1).expect("payload");
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn publish_failures_are_swallowed() {
        let queue = Arc::new(FlakyQueue {
            fail: true,
            published: Mutex::new(Vec::new()),
        });
        let publisher = EventPublisher::new(queue.clone());

        publisher.publish_chat_created("tok").await;

        assert!(queue.published.lock().unwrap().is_empty());
    }
}
