use std::time::Duration;

use relay_domain::aggregation::DrainSettings;
use relay_domain::cache_keys::CacheTtls;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub cache_backend: String,
    pub queue_backend: String,
    pub redis_url: String,
    pub queue_prefix: String,
    pub worker_inline: bool,
    pub aggregator_interval_ms: u64,
    pub indexer_interval_ms: u64,
    pub drain_budget_ms: u64,
    pub drain_max_events: usize,
    pub cache_seed_ttl_secs: u64,
    pub cache_entity_ttl_secs: u64,
    pub cache_list_ttl_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("cache_backend", "memory")?
            .set_default("queue_backend", "memory")?
            .set_default("redis_url", "redis://127.0.0.1:6379")?
            .set_default("queue_prefix", "relay:queues")?
            .set_default("worker_inline", true)?
            .set_default("aggregator_interval_ms", 10_000)?
            .set_default("indexer_interval_ms", 5_000)?
            .set_default("drain_budget_ms", 2_000)?
            .set_default("drain_max_events", 1_000)?
            .set_default("cache_seed_ttl_secs", 300)?
            .set_default("cache_entity_ttl_secs", 120)?
            .set_default("cache_list_ttl_secs", 120)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn cache_ttls(&self) -> CacheTtls {
        CacheTtls {
            seed: Duration::from_secs(self.cache_seed_ttl_secs),
            entity: Duration::from_secs(self.cache_entity_ttl_secs),
            listing: Duration::from_secs(self.cache_list_ttl_secs),
        }
    }

    pub fn drain_settings(&self) -> DrainSettings {
        DrainSettings {
            budget: Duration::from_millis(self.drain_budget_ms),
            max_events: self.drain_max_events,
        }
    }
}
