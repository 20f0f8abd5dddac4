use std::future::Future;
use std::time::Duration;

use metrics::counter;
use relay_domain::aggregation::{BatchAggregator, CycleReport};
use relay_domain::indexing::SearchIndexer;
use tokio::time::interval;

use crate::config::AppConfig;

const EVENTS_DRAINED_TOTAL: &str = "relay_worker_events_drained_total";
const KEYS_APPLIED_TOTAL: &str = "relay_worker_keys_applied_total";
const KEYS_SKIPPED_TOTAL: &str = "relay_worker_keys_skipped_total";

#[derive(Clone, Copy, Debug)]
pub struct SchedulerSettings {
    pub aggregator_interval: Duration,
    pub indexer_interval: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            aggregator_interval: Duration::from_millis(config.aggregator_interval_ms),
            indexer_interval: Duration::from_millis(config.indexer_interval_ms),
        }
    }
}

/// Ticker-driven runner for the background pipeline. Each tick executes one
/// bounded-duration cycle; the request path is reached only through the
/// queue and the store, never shared memory.
#[derive(Clone)]
pub struct WorkerScheduler {
    aggregator: BatchAggregator,
    indexer: SearchIndexer,
    settings: SchedulerSettings,
}

impl WorkerScheduler {
    pub fn new(
        aggregator: BatchAggregator,
        indexer: SearchIndexer,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            aggregator,
            indexer,
            settings,
        }
    }

    /// Runs both tickers until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut aggregator_tick = interval(self.settings.aggregator_interval);
        let mut indexer_tick = interval(self.settings.indexer_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = aggregator_tick.tick() => {
                    record_cycle("chat_counts", self.aggregator.run_chat_cycle().await);
                    record_cycle("message_counts", self.aggregator.run_message_cycle().await);
                }
                _ = indexer_tick.tick() => {
                    record_cycle("search_index", self.indexer.run_cycle().await);
                }
                _ = &mut shutdown => {
                    tracing::info!("scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// Detached in-process variant used by the API when `worker_inline` is
    /// on; the task lives until the process exits or the handle is aborted.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(std::future::pending()))
    }
}

fn record_cycle(stage: &'static str, report: CycleReport) {
    if report.is_noop() {
        return;
    }
    tracing::info!(
        stage,
        drained = report.drained,
        applied = report.applied,
        skipped = report.skipped,
        "pipeline cycle complete"
    );
    counter!(EVENTS_DRAINED_TOTAL, "stage" => stage).increment(report.drained as u64);
    counter!(KEYS_APPLIED_TOTAL, "stage" => stage).increment(report.applied as u64);
    counter!(KEYS_SKIPPED_TOTAL, "stage" => stage).increment(report.skipped as u64);
}
