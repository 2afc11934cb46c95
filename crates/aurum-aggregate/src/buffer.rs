use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use aurum_core::Tick;

/// Accumulated samples for one (provider, asset) key within the current
/// window. Optional fields (bid/ask/volume) are averaged over only the ticks
/// that carried them.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    prices: Vec<Decimal>,
    bids: Vec<Decimal>,
    asks: Vec<Decimal>,
    volumes: Vec<Decimal>,
    last_timestamp: Option<DateTime<Utc>>,
    last_meta: Option<serde_json::Value>,
}

/// Per-window averages produced when a buffer is drained.
#[derive(Debug, Clone)]
pub struct WindowSummary {
    pub price: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub sample_count: usize,
    pub last_timestamp: DateTime<Utc>,
    pub last_meta: Option<serde_json::Value>,
}

impl SampleBuffer {
    pub fn push(&mut self, tick: &Tick) {
        self.prices.push(tick.price);
        if let Some(bid) = tick.bid {
            self.bids.push(bid);
        }
        if let Some(ask) = tick.ask {
            self.asks.push(ask);
        }
        if let Some(volume) = tick.volume {
            self.volumes.push(volume);
        }
        self.last_timestamp = Some(tick.observed_at);
        self.last_meta = tick.meta.clone();
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Drains the buffer and returns the window averages, or `None` when no
    /// samples arrived or the running sum overflowed. The buffer is left
    /// empty in every case.
    pub fn drain(&mut self) -> Option<WindowSummary> {
        let sample_count = self.prices.len();
        let price = mean(&self.prices);
        let bid = mean(&self.bids);
        let ask = mean(&self.asks);
        let volume = mean(&self.volumes);
        let last_timestamp = self.last_timestamp;
        let last_meta = self.last_meta.take();

        self.prices.clear();
        self.bids.clear();
        self.asks.clear();
        self.volumes.clear();
        self.last_timestamp = None;

        Some(WindowSummary {
            price: price?,
            bid,
            ask,
            volume,
            sample_count,
            last_timestamp: last_timestamp.unwrap_or_else(Utc::now),
            last_meta,
        })
    }
}

fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let mut sum = Decimal::ZERO;
    for v in values {
        sum = sum.checked_add(*v)?;
    }
    sum.checked_div(Decimal::from(values.len() as u64))
}
