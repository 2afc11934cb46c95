//! Outbound event shapes.

use chrono::SecondsFormat;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use aurum_core::{kst, Snapshot};

/// JSON payload pushed to streaming clients. Prices are plain numbers and
/// the timestamp is rendered in KST, which is what the consuming frontends
/// expect.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    pub source: String,
    pub asset: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    pub sample_count: usize,
    pub timestamp: String,
}

impl From<&Snapshot> for StreamEvent {
    fn from(snap: &Snapshot) -> Self {
        let to_f64 = |d: rust_decimal::Decimal| d.to_f64().unwrap_or_default();
        Self {
            source: snap.provider.to_string(),
            asset: snap.asset.to_string(),
            price: to_f64(snap.price),
            bid: snap.bid.map(to_f64),
            ask: snap.ask.map(to_f64),
            volume: snap.volume.map(to_f64),
            sample_count: snap.sample_count,
            timestamp: snap
                .timestamp
                .with_timezone(&kst())
                .to_rfc3339_opts(SecondsFormat::Millis, false),
        }
    }
}

/// What a subscriber pulls off its queue.
#[derive(Debug, Clone)]
pub enum Event {
    Snapshot(StreamEvent),
    /// Emitted by the subscriber handle when no snapshot arrived within the
    /// heartbeat interval, keeping the HTTP connection warm.
    Heartbeat,
}
