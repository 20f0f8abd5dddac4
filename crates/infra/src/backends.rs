use std::sync::Arc;

use anyhow::Result;
use relay_domain::ports::cache::{CounterStore, ResponseCache};
use relay_domain::ports::queue::EventQueue;
use relay_domain::ports::search::SearchIndex;

use crate::cache::{MemoryCounterStore, MemoryResponseCache, RedisCounterStore, RedisResponseCache};
use crate::config::AppConfig;
use crate::queue::{MemoryEventQueue, RedisEventQueue};
use crate::repositories::MemoryStore;
use crate::search::MemorySearchIndex;

const COUNTER_PREFIX: &str = "relay:counters";
const RESPONSE_PREFIX: &str = "relay:responses";

/// One assembled set of adapters, selected from configuration and shared by
/// the API process and the standalone worker.
#[derive(Clone)]
pub struct Backends {
    pub store: MemoryStore,
    pub counters: Arc<dyn CounterStore>,
    pub cache: Arc<dyn ResponseCache>,
    pub queue: Arc<dyn EventQueue>,
    pub search: Arc<dyn SearchIndex>,
}

impl Backends {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        if !config.data_backend.eq_ignore_ascii_case("memory") {
            tracing::warn!(
                backend = %config.data_backend,
                "unknown data backend, falling back to memory"
            );
        }

        let counters: Arc<dyn CounterStore> = if config.cache_backend.eq_ignore_ascii_case("redis")
        {
            Arc::new(RedisCounterStore::connect(&config.redis_url, COUNTER_PREFIX).await?)
        } else {
            Arc::new(MemoryCounterStore::new())
        };
        let cache: Arc<dyn ResponseCache> = if config.cache_backend.eq_ignore_ascii_case("redis") {
            Arc::new(RedisResponseCache::connect(&config.redis_url, RESPONSE_PREFIX).await?)
        } else {
            Arc::new(MemoryResponseCache::new())
        };
        let queue: Arc<dyn EventQueue> = if config.queue_backend.eq_ignore_ascii_case("redis") {
            Arc::new(RedisEventQueue::connect(&config.redis_url, &config.queue_prefix).await?)
        } else {
            Arc::new(MemoryEventQueue::new())
        };

        Ok(Self {
            store: MemoryStore::new(),
            counters,
            cache,
            queue,
            search: Arc::new(MemorySearchIndex::new()),
        })
    }

    pub fn memory() -> Self {
        Self {
            store: MemoryStore::new(),
            counters: Arc::new(MemoryCounterStore::new()),
            cache: Arc::new(MemoryResponseCache::new()),
            queue: Arc::new(MemoryEventQueue::new()),
            search: Arc::new(MemorySearchIndex::new()),
        }
    }
}
