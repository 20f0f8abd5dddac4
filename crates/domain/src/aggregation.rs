use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache_keys;
use crate::caching;
use crate::error::DomainError;
use crate::events::{CHAT_CREATION_QUEUE, MESSAGE_CREATION_QUEUE, MessageCreatedEvent};
use crate::ports::cache::{CounterStore, ResponseCache};
use crate::ports::queue::EventQueue;
use crate::ports::store::{ApplicationRepository, ChatRepository};
use crate::view::View;

/// Bounds one drain phase so a cycle can never monopolize its tick.
#[derive(Clone, Copy, Debug)]
pub struct DrainSettings {
    pub budget: Duration,
    pub max_events: usize,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(2),
            max_events: 1_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub drained: usize,
    pub applied: usize,
    pub skipped: usize,
}

impl CycleReport {
    pub fn is_noop(&self) -> bool {
        self.drained == 0
    }
}

/// Converts queued creation events into authoritative counter updates.
///
/// Each cycle walks Draining -> Aggregating -> Committing and returns to
/// idle. Draining acks every payload as it is read (at-least-once: a crash
/// mid-cycle loses the in-memory tally). Committing applies one increment
/// per coalesced key; a failing key is skipped, never the whole batch.
#[derive(Clone)]
pub struct BatchAggregator {
    queue: Arc<dyn EventQueue>,
    applications: Arc<dyn ApplicationRepository>,
    chats: Arc<dyn ChatRepository>,
    counters: Arc<dyn CounterStore>,
    cache: Arc<dyn ResponseCache>,
    settings: DrainSettings,
}

impl BatchAggregator {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        applications: Arc<dyn ApplicationRepository>,
        chats: Arc<dyn ChatRepository>,
        counters: Arc<dyn CounterStore>,
        cache: Arc<dyn ResponseCache>,
        settings: DrainSettings,
    ) -> Self {
        Self {
            queue,
            applications,
            chats,
            counters,
            cache,
            settings,
        }
    }

    /// Applies pending `chat_creation_queue` events: per application token,
    /// one `chats_count += N` against the store, counter cache reconciled to
    /// the committed row value, stale response-cache entries dropped.
    pub async fn run_chat_cycle(&self) -> CycleReport {
        let payloads = drain_acked(self.queue.as_ref(), CHAT_CREATION_QUEUE, self.settings).await;
        if payloads.is_empty() {
            return CycleReport::default();
        }

        let mut batch: HashMap<String, i64> = HashMap::new();
        for payload in &payloads {
            match serde_json::from_str::<String>(payload) {
                Ok(token) => *batch.entry(token).or_insert(0) += 1,
                Err(err) => {
                    tracing::warn!(error = %err, "discarding malformed chat creation payload");
                }
            }
        }

        let mut report = CycleReport {
            drained: payloads.len(),
            ..CycleReport::default()
        };
        for (token, count) in batch {
            match self.applications.adjust_chats_count(&token, count).await {
                Ok(total) => {
                    caching::counter_set(
                        self.counters.as_ref(),
                        &cache_keys::application_chats_counter(&token),
                        total,
                    )
                    .await;
                    self.invalidate_application(&token).await;
                    tracing::debug!(token = %token, count, total, "applied chat count increment");
                    report.applied += 1;
                }
                Err(DomainError::NotFound) => {
                    tracing::warn!(token = %token, "skipping chat counts for unknown application");
                    report.skipped += 1;
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        token = %token,
                        "failed to apply chat count increment"
                    );
                    report.skipped += 1;
                }
            }
        }
        report
    }

    /// Applies pending `message_creation_queue` events: per chat, one
    /// `messages_count += N`, same reconciliation and invalidation rules.
    pub async fn run_message_cycle(&self) -> CycleReport {
        let payloads =
            drain_acked(self.queue.as_ref(), MESSAGE_CREATION_QUEUE, self.settings).await;
        if payloads.is_empty() {
            return CycleReport::default();
        }

        // key: chat id; the token/number ride along for cache invalidation
        let mut batch: HashMap<i64, (i64, String, i64)> = HashMap::new();
        for payload in &payloads {
            match serde_json::from_str::<MessageCreatedEvent>(payload) {
                Ok(event) => {
                    let entry = batch.entry(event.chat_id).or_insert((
                        0,
                        event.application_token.clone(),
                        event.chat_number,
                    ));
                    entry.0 += 1;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "discarding malformed message creation payload");
                }
            }
        }

        let mut report = CycleReport {
            drained: payloads.len(),
            ..CycleReport::default()
        };
        for (chat_id, (count, token, chat_number)) in batch {
            match self.chats.adjust_messages_count(chat_id, count).await {
                Ok(total) => {
                    caching::counter_set(
                        self.counters.as_ref(),
                        &cache_keys::chat_messages_counter(chat_id),
                        total,
                    )
                    .await;
                    self.invalidate_chat(&token, chat_number).await;
                    tracing::debug!(chat_id, count, total, "applied message count increment");
                    report.applied += 1;
                }
                Err(DomainError::NotFound) => {
                    tracing::warn!(chat_id, "skipping message counts for unknown chat");
                    report.skipped += 1;
                }
                Err(err) => {
                    tracing::error!(error = %err, chat_id, "failed to apply message count increment");
                    report.skipped += 1;
                }
            }
        }
        report
    }

    async fn invalidate_application(&self, token: &str) {
        for view in [View::Summary, View::Full] {
            caching::delete(
                self.cache.as_ref(),
                &cache_keys::application_token_key(token, view),
            )
            .await;
        }
        caching::delete_prefix(self.cache.as_ref(), cache_keys::applications_listing_prefix())
            .await;
    }

    async fn invalidate_chat(&self, token: &str, chat_number: i64) {
        for view in [View::Summary, View::Full] {
            caching::delete(
                self.cache.as_ref(),
                &cache_keys::chat_key(token, chat_number, view),
            )
            .await;
        }
        caching::delete_prefix(self.cache.as_ref(), &cache_keys::chats_listing_prefix(token))
            .await;
    }
}

/// Non-blocking poll loop that acks each payload immediately on read and
/// stops on empty queue, budget exhaustion, or the event cap.
pub(crate) async fn drain_acked(
    queue: &dyn EventQueue,
    name: &str,
    settings: DrainSettings,
) -> Vec<String> {
    let deadline = Instant::now() + settings.budget;
    let mut payloads = Vec::new();
    while payloads.len() < settings.max_events && Instant::now() < deadline {
        match queue.dequeue(name, Duration::ZERO).await {
            Ok(Some(payload)) => {
                if let Err(err) = queue.ack(name, &payload).await {
                    tracing::warn!(error = %err, queue = name, "failed to ack drained event");
                }
                payloads.push(payload);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, queue = name, "queue drain failed");
                break;
            }
        }
    }
    payloads
}
