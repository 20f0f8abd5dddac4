use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::aggregation::{CycleReport, DrainSettings};
use crate::events::{MessageCreatedEvent, SEARCH_INDEX_QUEUE};
use crate::ports::queue::EventQueue;
use crate::ports::search::SearchIndex;

/// Projects message-creation events into the search index.
///
/// Unlike the counter aggregator, payloads are acked only after the bulk
/// write succeeds: indexing is idempotent by message id, so redelivery after
/// a failure is safe and preferred over losing visibility.
#[derive(Clone)]
pub struct SearchIndexer {
    queue: Arc<dyn EventQueue>,
    index: Arc<dyn SearchIndex>,
    settings: DrainSettings,
}

impl SearchIndexer {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        index: Arc<dyn SearchIndex>,
        settings: DrainSettings,
    ) -> Self {
        Self {
            queue,
            index,
            settings,
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let deadline = Instant::now() + self.settings.budget;
        let mut pending: Vec<(String, MessageCreatedEvent)> = Vec::new();
        let mut report = CycleReport::default();

        while pending.len() < self.settings.max_events && Instant::now() < deadline {
            let payload = match self.queue.dequeue(SEARCH_INDEX_QUEUE, Duration::ZERO).await {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "search queue drain failed");
                    break;
                }
            };
            report.drained += 1;
            match serde_json::from_str::<MessageCreatedEvent>(&payload) {
                Ok(event) => pending.push((payload, event)),
                Err(err) => {
                    // poison payload: ack it away instead of retrying forever
                    tracing::warn!(error = %err, "discarding malformed search payload");
                    if let Err(err) = self.queue.ack(SEARCH_INDEX_QUEUE, &payload).await {
                        tracing::warn!(error = %err, "failed to ack malformed search payload");
                    }
                    report.skipped += 1;
                }
            }
        }

        if pending.is_empty() {
            return report;
        }

        let docs: Vec<_> = pending.iter().map(|(_, event)| event.search_doc()).collect();
        match self.index.index_bulk(&docs).await {
            Ok(()) => {
                for (payload, event) in &pending {
                    if let Err(err) = self.queue.ack(SEARCH_INDEX_QUEUE, payload).await {
                        tracing::warn!(
                            error = %err,
                            message_id = event.id,
                            "failed to ack indexed event"
                        );
                    }
                }
                tracing::debug!(indexed = docs.len(), "bulk indexed messages");
                report.applied = docs.len();
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    pending = pending.len(),
                    "bulk indexing failed, events will be retried"
                );
                if let Err(err) = self
                    .queue
                    .requeue_processing(SEARCH_INDEX_QUEUE, pending.len())
                    .await
                {
                    tracing::warn!(error = %err, "failed to requeue unindexed events");
                }
                report.skipped += pending.len();
            }
        }
        report
    }
}
