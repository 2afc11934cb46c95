//! Derived read models over the price store.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use aurum_core::{kst, Asset, Clock, Provider};
use aurum_persistence::{PriceStore, ReferencePrices, ReferenceWindows};

use crate::cache::TtlCache;
use crate::error::ReferenceResult;

/// Latest quote from one provider, as included in a statistics response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderQuote {
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// Cross-provider view of one asset. Providers with no stored data are
/// omitted; the aggregate fields cover only the providers present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub asset: Asset,
    pub providers: BTreeMap<String, ProviderQuote>,
    pub average: Option<Decimal>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReferenceConfig {
    pub statistics_ttl: Duration,
    pub reference_ttl: Duration,
    /// UTC (hour, minute) of the LSE close. Kept in UTC on purpose, matching
    /// the windows the stored data is queried with.
    pub lse_close_utc: (u32, u32),
    /// UTC (hour, minute) of the NYSE close.
    pub nyse_close_utc: (u32, u32),
    /// How far before a close to search for the last traded record.
    pub close_search_back: Duration,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            statistics_ttl: Duration::from_secs(5),
            reference_ttl: Duration::from_secs(60),
            lse_close_utc: (16, 30),
            nyse_close_utc: (21, 0),
            close_search_back: Duration::from_secs(2 * 3600),
        }
    }
}

/// Reads the price store and serves cached derived views.
pub struct ReferenceService {
    store: Arc<dyn PriceStore>,
    config: ReferenceConfig,
    clock: Arc<dyn Clock>,
    stats_cache: TtlCache<Asset, Statistics>,
    reference_cache: TtlCache<Vec<Asset>, HashMap<Asset, ReferencePrices>>,
}

impl ReferenceService {
    pub fn new(store: Arc<dyn PriceStore>, config: ReferenceConfig, clock: Arc<dyn Clock>) -> Self {
        let stats_cache = TtlCache::new(config.statistics_ttl, clock.clone());
        let reference_cache = TtlCache::new(config.reference_ttl, clock.clone());
        Self {
            store,
            config,
            clock,
            stats_cache,
            reference_cache,
        }
    }

    /// Latest-per-provider statistics for one asset.
    pub async fn statistics(&self, asset: Asset) -> ReferenceResult<Statistics> {
        if let Some(hit) = self.stats_cache.get(&asset) {
            debug!(%asset, "statistics served from cache");
            return Ok(hit);
        }

        let mut providers = BTreeMap::new();
        let mut prices = Vec::new();
        for provider in Provider::LIVE {
            let Some(record) = self.store.latest(provider, asset).await? else {
                continue;
            };
            prices.push(record.price);
            providers.insert(
                provider.as_str().to_string(),
                ProviderQuote {
                    price: record.price,
                    bid: record.bid,
                    ask: record.ask,
                    volume: record.volume,
                    timestamp: record.timestamp,
                },
            );
        }

        let min_price = prices.iter().min().copied();
        let max_price = prices.iter().max().copied();
        let average = mean(&prices);
        let spread = match (max_price, min_price) {
            (Some(max), Some(min)) => Some(max - min),
            _ => None,
        };

        let stats = Statistics {
            asset,
            providers,
            average,
            min_price,
            max_price,
            spread,
            last_updated: self.clock.now(),
        };
        self.stats_cache.insert(asset, stats.clone());
        Ok(stats)
    }

    /// Today's open plus the last LSE/NYSE close prices for each asset.
    pub async fn reference_prices(
        &self,
        assets: &[Asset],
    ) -> ReferenceResult<HashMap<Asset, ReferencePrices>> {
        let mut key: Vec<Asset> = assets.to_vec();
        key.sort();
        if let Some(hit) = self.reference_cache.get(&key) {
            debug!("reference prices served from cache");
            return Ok(hit);
        }

        let windows = self.windows(self.clock.now());
        let result = self.store.bulk_reference(assets, &windows).await?;
        self.reference_cache.insert(key, result.clone());
        Ok(result)
    }

    fn windows(&self, as_of: DateTime<Utc>) -> ReferenceWindows {
        let search_back = chrono::Duration::from_std(self.config.close_search_back)
            .unwrap_or_else(|_| chrono::Duration::hours(2));
        let lse_close = last_occurrence(as_of, self.config.lse_close_utc);
        let nyse_close = last_occurrence(as_of, self.config.nyse_close_utc);
        ReferenceWindows {
            open_start: kst_midnight(as_of),
            lse_close,
            lse_search_start: lse_close - search_back,
            nyse_close,
            nyse_search_start: nyse_close - search_back,
        }
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

/// Start of the current KST calendar day, in UTC.
fn kst_midnight(as_of: DateTime<Utc>) -> DateTime<Utc> {
    as_of
        .with_timezone(&kst())
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(kst()).single())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(as_of)
}

/// Most recent instant at (hour, minute) UTC at or before `as_of`.
fn last_occurrence(as_of: DateTime<Utc>, (hour, minute): (u32, u32)) -> DateTime<Utc> {
    let today = as_of
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .map(|dt| dt.and_utc());
    match today {
        Some(at) if at <= as_of => at,
        Some(at) => at - chrono::Duration::days(1),
        None => as_of,
    }
}
