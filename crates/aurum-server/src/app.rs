//! Main application orchestration.
//!
//! Wires the pipeline end to end: provider clients feed a tick channel, the
//! aggregator turns ticks into snapshots, and a fan-out task delivers each
//! snapshot to the hub and the store. The benchmark schedulers and the HTTP
//! server run alongside. Shutdown is ordered: providers stop first, the
//! aggregator flushes its final window, then the fan-out drains and exits.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aurum_aggregate::{run_aggregator, Aggregator, AggregatorConfig, SuppressPolicy};
use aurum_benchmark::{
    BenchmarkState, DailyRateConfig, DailyRateScheduler, FixingConfig, FixingScheduler,
    MetalsDevSource, SmbsSource,
};
use aurum_broadcast::{Hub, HubConfig};
use aurum_core::{MarketCalendar, Provider, Snapshot, SystemClock};
use aurum_persistence::{JsonLinesJournal, MemoryStore, PriceRecord, PriceStore};
use aurum_provider::{
    ConnectionHealth, EodhdStream, NaugoldPoll, PollClient, StreamClient, StreamConfig,
    TwelveDataPoll,
};
use aurum_reference::{ReferenceConfig, ReferenceService};
use aurum_telemetry::Metrics;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::http;

const TICK_CHANNEL_CAPACITY: usize = 1000;
const SNAPSHOT_CHANNEL_CAPACITY: usize = 256;
const FAN_OUT_BATCH: usize = 64;
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// One spawned provider client and its control surface.
pub struct ProviderHandle {
    pub provider: Provider,
    pub health: Arc<ConnectionHealth>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> AppResult<()> {
        let config = self.config;

        let store: Arc<dyn PriceStore> = Arc::new(build_store(&config)?);
        let hub = Arc::new(Hub::new(HubConfig {
            queue_capacity: config.broadcast.queue_capacity,
            heartbeat: Duration::from_secs(config.broadcast.heartbeat_secs),
        }));
        let benchmarks = Arc::new(BenchmarkState::new());
        let reference = Arc::new(ReferenceService::new(
            store.clone(),
            ReferenceConfig::default(),
            Arc::new(SystemClock),
        ));

        let (tick_tx, tick_rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);

        // Providers.
        let providers = spawn_providers(&config, tick_tx);

        // Aggregator.
        let aggregator = Arc::new(Aggregator::new(AggregatorConfig {
            window: config.window(),
            suppress: SuppressPolicy {
                threshold: Decimal::try_from(config.aggregation.suppress_threshold)
                    .unwrap_or_else(|_| Decimal::new(1, 6)),
                emit_first: true,
                reset_after: Some(Duration::from_secs(config.aggregation.suppress_reset_secs)),
            },
        }));
        let aggregator_token = CancellationToken::new();
        let aggregator_task = tokio::spawn(run_aggregator(
            aggregator,
            tick_rx,
            snapshot_tx,
            aggregator_token.clone(),
        ));

        // Snapshot fan-out: hub first, then the store. A store failure is
        // logged and never interrupts delivery.
        let fanout_task = tokio::spawn(fan_out(snapshot_rx, hub.clone(), store.clone()));

        // Benchmark schedulers.
        let benchmark_token = CancellationToken::new();
        let mut benchmark_tasks = Vec::new();
        if config.providers.metals_dev_api_key.is_empty() {
            warn!("No metals.dev API key configured, fixing scheduler disabled");
        } else {
            let scheduler = FixingScheduler::new(
                MetalsDevSource::new(config.providers.metals_dev_api_key.clone()),
                FixingConfig::default(),
                MarketCalendar::uk(),
                benchmarks.clone(),
                benchmark_token.clone(),
            );
            benchmark_tasks.push(tokio::spawn(scheduler.run()));
        }
        let daily_rate = DailyRateScheduler::new(
            SmbsSource::new(),
            DailyRateConfig::default(),
            MarketCalendar::kr(),
            benchmarks.clone(),
            benchmark_token.clone(),
        );
        benchmark_tasks.push(tokio::spawn(daily_rate.run()));

        // Retention pruning.
        let prune_token = CancellationToken::new();
        let prune_task = tokio::spawn(prune_loop(
            store.clone(),
            config.persistence.retention_days,
            prune_token.clone(),
        ));

        // HTTP server.
        let http_token = CancellationToken::new();
        let state = http::AppState::new(
            hub,
            reference,
            benchmarks,
            providers
                .iter()
                .map(|p| (p.provider, p.health.clone()))
                .collect(),
        );
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "HTTP server listening");
        let http_task = {
            let token = http_token.clone();
            let router = http::router(state);
            tokio::spawn(async move {
                let result = axum::serve(listener, router)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await;
                if let Err(e) = result {
                    error!(error = %e, "HTTP server error");
                }
            })
        };

        tokio::signal::ctrl_c()
            .await
            .map_err(AppError::Io)?;
        info!("Shutdown signal received");

        // Ordered teardown. Providers go first so no new ticks arrive, the
        // aggregator flushes what it buffered, and the fan-out exits when
        // the snapshot channel closes behind it.
        for handle in providers {
            handle.token.cancel();
            let _ = handle.task.await;
        }
        aggregator_token.cancel();
        let _ = aggregator_task.await;
        let _ = fanout_task.await;

        benchmark_token.cancel();
        for task in benchmark_tasks {
            let _ = task.await;
        }
        prune_token.cancel();
        let _ = prune_task.await;
        http_token.cancel();
        let _ = http_task.await;

        info!("Shutdown complete");
        Ok(())
    }
}

fn build_store(config: &AppConfig) -> AppResult<MemoryStore> {
    let store = MemoryStore::new(config.persistence.max_records_per_asset);
    if config.persistence.journal_dir.is_empty() {
        return Ok(store);
    }
    let journal = JsonLinesJournal::new(config.persistence.journal_dir.clone(), 100);
    info!(dir = %config.persistence.journal_dir, "Price journal enabled");
    Ok(store.with_journal(journal))
}

fn spawn_providers(config: &AppConfig, tick_tx: mpsc::Sender<aurum_core::Tick>) -> Vec<ProviderHandle> {
    let mut handles = Vec::new();
    let stream_config = StreamConfig {
        reconnect_base_delay: Duration::from_secs(config.providers.reconnect_base_delay_secs),
        reconnect_max_delay: Duration::from_secs(config.providers.reconnect_max_delay_secs),
        watchdog_timeout: Duration::from_secs(config.providers.watchdog_timeout_secs),
    };

    if config.providers.eodhd_api_key.is_empty() {
        warn!("No EODHD API key configured, stream client disabled");
    } else {
        let client = Arc::new(StreamClient::new(
            EodhdStream::new(config.providers.eodhd_api_key.clone()),
            stream_config,
            tick_tx.clone(),
        ));
        let health = client.health();
        let token = client.shutdown_token();
        let task = tokio::spawn(async move {
            if let Err(e) = client.run().await {
                error!(provider = %Provider::Eodhd, error = %e, "Stream client failed");
            }
        });
        handles.push(ProviderHandle {
            provider: Provider::Eodhd,
            health,
            token,
            task,
        });
    }

    if config.providers.twelve_data_api_key.is_empty() {
        warn!("No Twelve Data API key configured, poll client disabled");
    } else {
        let mut client = PollClient::new(
            TwelveDataPoll::new(
                config.providers.twelve_data_api_key.clone(),
                Duration::from_secs(config.providers.twelve_data_interval_secs),
            ),
            tick_tx.clone(),
        );
        let health = client.health();
        let token = client.shutdown_token();
        let task = tokio::spawn(async move {
            if let Err(e) = client.run().await {
                error!(provider = %Provider::TwelveData, error = %e, "Poll client failed");
            }
        });
        handles.push(ProviderHandle {
            provider: Provider::TwelveData,
            health,
            token,
            task,
        });
    }

    let mut client = PollClient::new(
        NaugoldPoll::new(Duration::from_secs(config.providers.naugold_interval_secs)),
        tick_tx,
    );
    let health = client.health();
    let token = client.shutdown_token();
    let task = tokio::spawn(async move {
        if let Err(e) = client.run().await {
            error!(provider = %Provider::Naugold, error = %e, "Poll client failed");
        }
    });
    handles.push(ProviderHandle {
        provider: Provider::Naugold,
        health,
        token,
        task,
    });

    handles
}

/// Deliver snapshots to subscribers and persist them. Snapshots from one
/// window flush arrive back to back, so the drained batch usually maps to
/// one `append_batch` call per window.
async fn fan_out(
    mut snapshot_rx: mpsc::Receiver<Snapshot>,
    hub: Arc<Hub>,
    store: Arc<dyn PriceStore>,
) {
    let mut batch: Vec<Snapshot> = Vec::with_capacity(FAN_OUT_BATCH);
    loop {
        if snapshot_rx.recv_many(&mut batch, FAN_OUT_BATCH).await == 0 {
            break;
        }
        for snapshot in &batch {
            Metrics::snapshot_emitted(snapshot.provider.as_str());
            hub.publish(snapshot);
        }
        Metrics::subscribers(hub.subscriber_count() as i64);
        let records: Vec<PriceRecord> = batch.iter().map(PriceRecord::from).collect();
        if let Err(e) = store.append_batch(records).await {
            error!(count = batch.len(), error = %e, "Failed to persist snapshot batch");
        }
        batch.clear();
    }
    info!("Snapshot fan-out stopped");
}

async fn prune_loop(store: Arc<dyn PriceStore>, retention_days: u64, token: CancellationToken) {
    let mut interval = tokio::time::interval(PRUNE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = interval.tick() => {}
        }
        let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
        match store.prune_older_than(cutoff).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Pruned old price records"),
            Err(e) => warn!(error = %e, "Prune failed"),
        }
    }
}
