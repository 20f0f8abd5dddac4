use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use relay_domain::aggregation::{BatchAggregator, DrainSettings};
use relay_domain::cache_keys;
use relay_domain::events::{
    CHAT_CREATION_QUEUE, EventPublisher, MESSAGE_CREATION_QUEUE, MessageCreatedEvent,
    SEARCH_INDEX_QUEUE,
};
use relay_domain::indexing::SearchIndexer;
use relay_domain::ports::BoxFuture;
use relay_domain::ports::cache::{CounterStore, ResponseCache};
use relay_domain::ports::queue::EventQueue;
use relay_domain::ports::search::{
    SearchDoc, SearchError, SearchHits, SearchIndex, SearchMode, SearchQuery,
};
use relay_domain::ports::store::{
    ApplicationRepository, ChatRepository, MessageRepository, NewApplication, NewChat, NewMessage,
};
use relay_domain::util::new_token;
use relay_domain::view::View;
use relay_infra::cache::{MemoryCounterStore, MemoryResponseCache};
use relay_infra::queue::MemoryEventQueue;
use relay_infra::repositories::MemoryStore;
use relay_infra::search::MemorySearchIndex;

struct Pipeline {
    store: MemoryStore,
    queue: Arc<MemoryEventQueue>,
    counters: Arc<MemoryCounterStore>,
    cache: Arc<MemoryResponseCache>,
    aggregator: BatchAggregator,
}

fn pipeline() -> Pipeline {
    let store = MemoryStore::new();
    let queue = Arc::new(MemoryEventQueue::new());
    let counters = Arc::new(MemoryCounterStore::new());
    let cache = Arc::new(MemoryResponseCache::new());
    let aggregator = BatchAggregator::new(
        queue.clone(),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        counters.clone(),
        cache.clone(),
        DrainSettings::default(),
    );
    Pipeline {
        store,
        queue,
        counters,
        cache,
        aggregator,
    }
}

async fn seed_application(store: &MemoryStore, name: &str) -> relay_domain::application::Application {
    ApplicationRepository::create(
        store,
        &NewApplication {
            name: name.to_string(),
            token: new_token(),
        },
    )
    .await
    .expect("application")
}

#[tokio::test]
async fn chat_cycle_applies_coalesced_increments() {
    let pipeline = pipeline();
    let application = seed_application(&pipeline.store, "Counts").await;
    let publisher = EventPublisher::new(pipeline.queue.clone());

    // a cached rendering that must be dropped once counts move
    pipeline
        .cache
        .set(
            &cache_keys::application_token_key(&application.token, View::Summary),
            "stale",
            std::time::Duration::from_secs(60),
        )
        .await
        .expect("cache seed");

    for _ in 0..5 {
        publisher.publish_chat_created(&application.token).await;
    }

    let report = pipeline.aggregator.run_chat_cycle().await;
    assert_eq!(report.drained, 5);
    assert_eq!(report.applied, 1, "five events coalesce into one key");
    assert_eq!(report.skipped, 0);

    let row = pipeline
        .store
        .find_by_token(&application.token)
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(row.chats_count, 5);
    assert_eq!(
        pipeline
            .counters
            .get(&cache_keys::application_chats_counter(&application.token))
            .await
            .expect("counter"),
        Some(5)
    );
    assert_eq!(
        pipeline
            .cache
            .get(&cache_keys::application_token_key(&application.token, View::Summary))
            .await
            .expect("cache"),
        None,
        "stale rendering was invalidated"
    );
    assert_eq!(pipeline.queue.depths(CHAT_CREATION_QUEUE), (0, 0));
}

#[tokio::test]
async fn chat_cycle_skips_unknown_tokens_without_aborting() {
    let pipeline = pipeline();
    let application = seed_application(&pipeline.store, "Partial").await;
    let publisher = EventPublisher::new(pipeline.queue.clone());

    publisher.publish_chat_created(&application.token).await;
    publisher.publish_chat_created("no-such-application").await;
    publisher.publish_chat_created(&application.token).await;

    let report = pipeline.aggregator.run_chat_cycle().await;
    assert_eq!(report.drained, 3);
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 1);

    let row = pipeline
        .store
        .find_by_token(&application.token)
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(row.chats_count, 2);
}

#[tokio::test]
async fn empty_cycle_is_a_noop() {
    let pipeline = pipeline();
    let report = pipeline.aggregator.run_chat_cycle().await;
    assert!(report.is_noop());
    let report = pipeline.aggregator.run_message_cycle().await;
    assert!(report.is_noop());
}

#[tokio::test]
async fn message_cycle_reconciles_per_chat_counts() {
    let pipeline = pipeline();
    let application = seed_application(&pipeline.store, "Messages").await;
    let chat = ChatRepository::create(
        &pipeline.store,
        &NewChat {
            application_id: application.id,
        },
    )
    .await
    .expect("chat");
    let publisher = EventPublisher::new(pipeline.queue.clone());

    for body in ["one", "two", "three"] {
        let message = MessageRepository::create(
            &pipeline.store,
            &NewMessage {
                chat_id: chat.id,
                application_id: application.id,
                body: body.to_string(),
            },
        )
        .await
        .expect("message");
        publisher
            .publish_message_created(&MessageCreatedEvent::from_message(
                &message,
                &application.token,
                chat.number,
            ))
            .await;
    }

    let report = pipeline.aggregator.run_message_cycle().await;
    assert_eq!(report.drained, 3);
    assert_eq!(report.applied, 1);

    let row = pipeline
        .store
        .find_by_number(application.id, chat.number)
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(row.messages_count, 3);
    assert_eq!(
        pipeline
            .counters
            .get(&cache_keys::chat_messages_counter(chat.id))
            .await
            .expect("counter"),
        Some(3)
    );
    assert_eq!(pipeline.queue.depths(MESSAGE_CREATION_QUEUE), (0, 0));
}

/// Fails every bulk write until released, to exercise the indexer's
/// retry-on-unacked path.
struct FlakyIndex {
    inner: MemorySearchIndex,
    failing: AtomicBool,
}

impl FlakyIndex {
    fn new() -> Self {
        Self {
            inner: MemorySearchIndex::new(),
            failing: AtomicBool::new(true),
        }
    }

    fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }
}

impl SearchIndex for FlakyIndex {
    fn index(&self, doc: &SearchDoc) -> BoxFuture<'_, Result<(), SearchError>> {
        self.inner.index(doc)
    }

    fn index_bulk(&self, docs: &[SearchDoc]) -> BoxFuture<'_, Result<(), SearchError>> {
        if self.failing.load(Ordering::SeqCst) {
            return Box::pin(async move { Err(SearchError::Unavailable("index down".into())) });
        }
        self.inner.index_bulk(docs)
    }

    fn search(&self, query: &SearchQuery) -> BoxFuture<'_, Result<SearchHits, SearchError>> {
        self.inner.search(query)
    }

    fn delete_by_chat(&self, chat_id: i64) -> BoxFuture<'_, Result<u64, SearchError>> {
        self.inner.delete_by_chat(chat_id)
    }
}

fn sample_event(id: i64, body: &str) -> MessageCreatedEvent {
    MessageCreatedEvent {
        id,
        number: id,
        body: body.to_string(),
        chat_id: 1,
        chat_number: 1,
        application_id: 1,
        application_token: "tok".to_string(),
        created_at_ms: id * 1_000,
    }
}

#[tokio::test]
async fn indexer_projects_drained_events() {
    let queue = Arc::new(MemoryEventQueue::new());
    let index = Arc::new(MemorySearchIndex::new());
    let indexer = SearchIndexer::new(queue.clone(), index.clone(), DrainSettings::default());

    let payload = serde_json::to_string(&sample_event(5, "hello world")).expect("payload");
    queue.publish(SEARCH_INDEX_QUEUE, &payload).await.expect("publish");

    let report = indexer.run_cycle().await;
    assert_eq!(report.drained, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(queue.depths(SEARCH_INDEX_QUEUE), (0, 0));

    let hits = index
        .search(&SearchQuery {
            text: "hello".to_string(),
            mode: SearchMode::Match,
            chat_id: None,
            offset: 0,
            limit: 10,
        })
        .await
        .expect("search");
    assert_eq!(hits.total, 1);
    assert_eq!(hits.hits[0].id, 5);
}

#[tokio::test]
async fn indexer_retries_unacked_events_after_failure() {
    let queue = Arc::new(MemoryEventQueue::new());
    let index = Arc::new(FlakyIndex::new());
    let indexer = SearchIndexer::new(queue.clone(), index.clone(), DrainSettings::default());

    let payload = serde_json::to_string(&sample_event(9, "retry me")).expect("payload");
    queue.publish(SEARCH_INDEX_QUEUE, &payload).await.expect("publish");

    let report = indexer.run_cycle().await;
    assert_eq!(report.skipped, 1);
    assert_eq!(queue.depths(SEARCH_INDEX_QUEUE), (1, 0), "event went back to ready");

    index.recover();
    let report = indexer.run_cycle().await;
    assert_eq!(report.applied, 1);
    assert_eq!(queue.depths(SEARCH_INDEX_QUEUE), (0, 0));

    let hits = index
        .search(&SearchQuery {
            text: "retry".to_string(),
            mode: SearchMode::Match,
            chat_id: None,
            offset: 0,
            limit: 10,
        })
        .await
        .expect("search");
    assert_eq!(hits.total, 1);
}

#[tokio::test]
async fn indexer_discards_malformed_payloads() {
    let queue = Arc::new(MemoryEventQueue::new());
    let index = Arc::new(MemorySearchIndex::new());
    let indexer = SearchIndexer::new(queue.clone(), index.clone(), DrainSettings::default());

    queue
        .publish(SEARCH_INDEX_QUEUE, "{not json")
        .await
        .expect("publish");
    let payload = serde_json::to_string(&sample_event(2, "fine")).expect("payload");
    queue.publish(SEARCH_INDEX_QUEUE, &payload).await.expect("publish");

    let report = indexer.run_cycle().await;
    assert_eq!(report.drained, 2);
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(queue.depths(SEARCH_INDEX_QUEUE), (0, 0));
}
