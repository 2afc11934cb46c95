use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aurum_core::{Asset, Provider, Snapshot, Tick};

use crate::buffer::SampleBuffer;

/// Controls when a window mean is close enough to the previously emitted
/// value to be dropped instead of re-broadcast.
#[derive(Debug, Clone)]
pub struct SuppressPolicy {
    /// Relative change below which a snapshot is considered unchanged.
    pub threshold: Decimal,
    /// Emit the first snapshot for a key even if suppression would apply.
    pub emit_first: bool,
    /// Force an emission once this much time has passed since the last one,
    /// so downstream consumers see a periodic confirmation of a flat price.
    pub reset_after: Option<Duration>,
}

impl Default for SuppressPolicy {
    fn default() -> Self {
        Self {
            threshold: Decimal::new(1, 6), // 0.000001
            emit_first: true,
            reset_after: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub window: Duration,
    pub suppress: SuppressPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3),
            suppress: SuppressPolicy::default(),
        }
    }
}

struct LastEmit {
    price: Decimal,
    at: Instant,
}

/// Buffers raw ticks per (provider, asset) key and collapses each window into
/// at most one snapshot per key.
pub struct Aggregator {
    buffers: DashMap<(Provider, Asset), SampleBuffer>,
    last_emitted: DashMap<(Provider, Asset), LastEmit>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            buffers: DashMap::new(),
            last_emitted: DashMap::new(),
            config,
        }
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }

    /// Adds one tick to its key's buffer. Invalid ticks (non-positive price)
    /// are dropped without affecting the buffer.
    pub fn add(&self, tick: &Tick) {
        if !tick.is_valid() {
            debug!(provider = %tick.provider, asset = %tick.asset, "dropping invalid tick");
            return;
        }
        self.buffers.entry(tick.key()).or_default().push(tick);
    }

    /// Closes the current window: every non-empty buffer is drained and the
    /// surviving (non-suppressed) snapshots are returned. Buffers are left
    /// empty whether or not their snapshot was suppressed.
    pub fn flush(&self) -> Vec<Snapshot> {
        let mut out = Vec::new();
        for mut entry in self.buffers.iter_mut() {
            let (provider, asset) = *entry.key();
            let Some(summary) = entry.value_mut().drain() else {
                continue;
            };
            if self.suppressed(provider, asset, summary.price) {
                debug!(%provider, %asset, price = %summary.price, "snapshot suppressed");
                continue;
            }
            self.last_emitted.insert(
                (provider, asset),
                LastEmit {
                    price: summary.price,
                    at: Instant::now(),
                },
            );
            out.push(Snapshot {
                provider,
                asset,
                price: summary.price,
                bid: summary.bid,
                ask: summary.ask,
                volume: summary.volume,
                sample_count: summary.sample_count,
                timestamp: summary.last_timestamp,
                meta: summary.last_meta,
            });
        }
        out
    }

    fn suppressed(&self, provider: Provider, asset: Asset, price: Decimal) -> bool {
        let Some(last) = self.last_emitted.get(&(provider, asset)) else {
            return !self.config.suppress.emit_first;
        };
        if let Some(reset_after) = self.config.suppress.reset_after {
            if last.at.elapsed() >= reset_after {
                return false;
            }
        }
        if last.price.is_zero() {
            return false;
        }
        let relative = ((price - last.price) / last.price).abs();
        relative < self.config.suppress.threshold
    }
}

/// Drives an [`Aggregator`] from a tick channel: buffers incoming ticks,
/// flushes on the window cadence, and performs one final flush on shutdown so
/// buffered samples are not lost.
pub async fn run_aggregator(
    aggregator: Arc<Aggregator>,
    mut tick_rx: mpsc::Receiver<Tick>,
    snapshot_tx: mpsc::Sender<Snapshot>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(aggregator.window());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(window_ms = aggregator.window().as_millis() as u64, "aggregator started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                emit_all(&aggregator, &snapshot_tx).await;
                info!("aggregator stopped");
                return;
            }
            tick = tick_rx.recv() => {
                match tick {
                    Some(tick) => aggregator.add(&tick),
                    None => {
                        emit_all(&aggregator, &snapshot_tx).await;
                        warn!("tick channel closed, aggregator exiting");
                        return;
                    }
                }
            }
            _ = interval.tick() => {
                emit_all(&aggregator, &snapshot_tx).await;
            }
        }
    }
}

async fn emit_all(aggregator: &Aggregator, snapshot_tx: &mpsc::Sender<Snapshot>) {
    for snapshot in aggregator.flush() {
        if snapshot_tx.send(snapshot).await.is_err() {
            warn!("snapshot channel closed, dropping window output");
            return;
        }
    }
}
