//! Raw and aggregated price samples.

use crate::{Asset, Provider};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One normalized price observation from a provider.
///
/// Ticks are ephemeral: they live in an aggregation buffer until the next
/// window flush and are never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub provider: Provider,
    pub asset: Asset,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
    /// Provider-specific payload (upstream symbol, source URL, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl Tick {
    /// Create a tick with only a price, observed now.
    pub fn new(provider: Provider, asset: Asset, price: Decimal) -> Self {
        Self {
            provider,
            asset,
            price,
            bid: None,
            ask: None,
            volume: None,
            observed_at: Utc::now(),
            meta: None,
        }
    }

    /// A tick is usable for aggregation only if its price is positive.
    pub fn is_valid(&self) -> bool {
        self.price > Decimal::ZERO
    }

    pub fn key(&self) -> (Provider, Asset) {
        (self.provider, self.asset)
    }
}

/// Aggregated, de-noised sample emitted at most once per window per
/// (provider, asset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub provider: Provider,
    pub asset: Asset,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    /// Number of ticks averaged into this snapshot.
    pub sample_count: usize,
    /// Representative timestamp: the most recent tick in the window.
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl Snapshot {
    pub fn key(&self) -> (Provider, Asset) {
        (self.provider, self.asset)
    }
}
