mod observability;

use std::sync::Arc;

use relay_domain::aggregation::BatchAggregator;
use relay_domain::indexing::SearchIndexer;
use relay_domain::ports::store::{ApplicationRepository, ChatRepository};
use relay_infra::backends::Backends;
use relay_infra::scheduler::{SchedulerSettings, WorkerScheduler};
use relay_infra::{config::AppConfig, logging::init_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config)?;
    observability::init_metrics()?;

    if !config.queue_backend.eq_ignore_ascii_case("redis") {
        tracing::warn!(
            "memory queue backend is process-local; the standalone worker will see no events \
             (enable worker_inline on the api instead)"
        );
    }

    let backends = Backends::from_config(&config).await?;
    let applications: Arc<dyn ApplicationRepository> = Arc::new(backends.store.clone());
    let chats: Arc<dyn ChatRepository> = Arc::new(backends.store.clone());
    let aggregator = BatchAggregator::new(
        backends.queue.clone(),
        applications,
        chats,
        backends.counters.clone(),
        backends.cache.clone(),
        config.drain_settings(),
    );
    let indexer = SearchIndexer::new(
        backends.queue.clone(),
        backends.search.clone(),
        config.drain_settings(),
    );
    let scheduler = WorkerScheduler::new(
        aggregator,
        indexer,
        SchedulerSettings::from_config(&config),
    );

    info!("worker starting");
    scheduler.run(shutdown_signal()).await;
    info!("worker shutdown");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
