use std::sync::Arc;

use relay_domain::aggregation::BatchAggregator;
use relay_domain::application::ApplicationService;
use relay_domain::chat::ChatService;
use relay_domain::events::EventPublisher;
use relay_domain::indexing::SearchIndexer;
use relay_domain::message::MessageService;
use relay_domain::ports::store::{ApplicationRepository, ChatRepository, MessageRepository};
use relay_infra::backends::Backends;
use relay_infra::config::AppConfig;

/// Everything a handler needs, constructed once at process start and passed
/// down; collaborators are explicit, never ambient.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub applications: ApplicationService,
    pub chats: ChatService,
    pub messages: MessageService,
    pub aggregator: BatchAggregator,
    pub indexer: SearchIndexer,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let backends = Backends::from_config(&config).await?;
        Ok(Self::with_backends(config, backends))
    }

    pub fn with_backends(config: AppConfig, backends: Backends) -> Self {
        let ttls = config.cache_ttls();
        let drain = config.drain_settings();

        let applications_repo: Arc<dyn ApplicationRepository> = Arc::new(backends.store.clone());
        let chats_repo: Arc<dyn ChatRepository> = Arc::new(backends.store.clone());
        let messages_repo: Arc<dyn MessageRepository> = Arc::new(backends.store.clone());
        let publisher = EventPublisher::new(backends.queue.clone());

        let applications = ApplicationService::new(
            applications_repo.clone(),
            chats_repo.clone(),
            backends.counters.clone(),
            backends.cache.clone(),
            backends.search.clone(),
            ttls,
        );
        let chats = ChatService::new(
            applications_repo.clone(),
            chats_repo.clone(),
            messages_repo.clone(),
            backends.counters.clone(),
            backends.cache.clone(),
            backends.search.clone(),
            publisher.clone(),
            ttls,
        );
        let messages = MessageService::new(
            applications_repo.clone(),
            chats_repo.clone(),
            messages_repo,
            backends.cache.clone(),
            backends.search.clone(),
            publisher,
            ttls,
        );
        let aggregator = BatchAggregator::new(
            backends.queue.clone(),
            applications_repo,
            chats_repo,
            backends.counters,
            backends.cache,
            drain,
        );
        let indexer = SearchIndexer::new(backends.queue, backends.search, drain);

        Self {
            config,
            applications,
            chats,
            messages,
            aggregator,
            indexer,
        }
    }
}
