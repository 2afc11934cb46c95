//! `PriceStore` trait and the in-memory implementation.
//!
//! Records are appended in arrival order, which for this pipeline is also
//! timestamp order per asset (one flush completes before the next starts
//! for a key). Window queries rely on that ordering.

use crate::error::PersistenceResult;
use crate::journal::JsonLinesJournal;
use async_trait::async_trait;
use aurum_core::{Asset, Provider, Snapshot};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One persisted price row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub provider: Provider,
    pub asset: Asset,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Snapshot> for PriceRecord {
    fn from(s: &Snapshot) -> Self {
        Self {
            provider: s.provider,
            asset: s.asset,
            price: s.price,
            bid: s.bid,
            ask: s.ask,
            volume: s.volume,
            timestamp: s.timestamp,
        }
    }
}

/// Time windows for the bulk reference query, precomputed by the caller.
#[derive(Debug, Clone)]
pub struct ReferenceWindows {
    /// Start of the current session (KST midnight, in UTC).
    pub open_start: DateTime<Utc>,
    /// Most recent LSE close and how far back to search before it.
    pub lse_close: DateTime<Utc>,
    pub lse_search_start: DateTime<Utc>,
    /// Most recent NYSE close and its search window start.
    pub nyse_close: DateTime<Utc>,
    pub nyse_search_start: DateTime<Utc>,
}

/// Per-asset result of the bulk reference query. A missing window is a
/// `None` field, never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferencePrices {
    pub today_open: Option<Decimal>,
    pub lse_close: Option<Decimal>,
    pub nyse_close: Option<Decimal>,
}

/// Append/query surface consumed by the pipeline core.
///
/// Implementations must treat appends as atomic single-record or
/// single-batch operations; no multi-statement transactions are required.
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn append(&self, record: PriceRecord) -> PersistenceResult<()>;

    async fn append_batch(&self, records: Vec<PriceRecord>) -> PersistenceResult<()>;

    /// Latest record for one (provider, asset) pair.
    async fn latest(&self, provider: Provider, asset: Asset)
        -> PersistenceResult<Option<PriceRecord>>;

    /// First record for `asset` (any provider) at or after `after`.
    async fn first_after(
        &self,
        asset: Asset,
        after: DateTime<Utc>,
    ) -> PersistenceResult<Option<PriceRecord>>;

    /// Last record for `asset` (any provider) within `[from, to]`.
    async fn last_before(
        &self,
        asset: Asset,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PersistenceResult<Option<PriceRecord>>;

    /// Resolve today's open and the two market closes for each asset.
    async fn bulk_reference(
        &self,
        assets: &[Asset],
        windows: &ReferenceWindows,
    ) -> PersistenceResult<HashMap<Asset, ReferencePrices>>;

    /// Drop records older than `cutoff`. Returns the number removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> PersistenceResult<usize>;
}

/// In-memory store with bounded per-asset retention.
pub struct MemoryStore {
    records: RwLock<HashMap<Asset, Vec<PriceRecord>>>,
    /// Cap per asset; oldest rows are dropped past it.
    max_records_per_asset: usize,
    /// Optional append-only journal mirroring every write.
    journal: Option<Mutex<JsonLinesJournal>>,
}

impl MemoryStore {
    pub fn new(max_records_per_asset: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_records_per_asset,
            journal: None,
        }
    }

    /// Attach a JSON Lines journal; every appended record is also written
    /// there. Journal failures are logged by the caller side via the
    /// returned error, but never corrupt the in-memory state.
    pub fn with_journal(mut self, journal: JsonLinesJournal) -> Self {
        self.journal = Some(Mutex::new(journal));
        self
    }

    fn push(&self, record: PriceRecord) {
        let mut map = self.records.write();
        let rows = map.entry(record.asset).or_default();
        rows.push(record);
        if rows.len() > self.max_records_per_asset {
            let excess = rows.len() - self.max_records_per_asset;
            rows.drain(..excess);
        }
    }

    fn journal_all(&self, records: &[PriceRecord]) -> PersistenceResult<()> {
        if let Some(journal) = &self.journal {
            let mut journal = journal.lock();
            for record in records {
                journal.append(record)?;
            }
            journal.flush()?;
        }
        Ok(())
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn append(&self, record: PriceRecord) -> PersistenceResult<()> {
        self.journal_all(std::slice::from_ref(&record))?;
        self.push(record);
        Ok(())
    }

    async fn append_batch(&self, records: Vec<PriceRecord>) -> PersistenceResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.journal_all(&records)?;
        let count = records.len();
        for record in records {
            self.push(record);
        }
        debug!(count, "Batch appended to price store");
        Ok(())
    }

    async fn latest(
        &self,
        provider: Provider,
        asset: Asset,
    ) -> PersistenceResult<Option<PriceRecord>> {
        let map = self.records.read();
        Ok(map
            .get(&asset)
            .and_then(|rows| rows.iter().rev().find(|r| r.provider == provider))
            .cloned())
    }

    async fn first_after(
        &self,
        asset: Asset,
        after: DateTime<Utc>,
    ) -> PersistenceResult<Option<PriceRecord>> {
        let map = self.records.read();
        Ok(map
            .get(&asset)
            .and_then(|rows| rows.iter().find(|r| r.timestamp >= after))
            .cloned())
    }

    async fn last_before(
        &self,
        asset: Asset,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PersistenceResult<Option<PriceRecord>> {
        let map = self.records.read();
        Ok(map
            .get(&asset)
            .and_then(|rows| {
                rows.iter()
                    .rev()
                    .find(|r| r.timestamp >= from && r.timestamp <= to)
            })
            .cloned())
    }

    async fn bulk_reference(
        &self,
        assets: &[Asset],
        windows: &ReferenceWindows,
    ) -> PersistenceResult<HashMap<Asset, ReferencePrices>> {
        let mut result = HashMap::new();
        for &asset in assets {
            let today_open = self.first_after(asset, windows.open_start).await?;
            let lse = self
                .last_before(asset, windows.lse_search_start, windows.lse_close)
                .await?;
            let nyse = self
                .last_before(asset, windows.nyse_search_start, windows.nyse_close)
                .await?;
            result.insert(
                asset,
                ReferencePrices {
                    today_open: today_open.map(|r| r.price),
                    lse_close: lse.map(|r| r.price),
                    nyse_close: nyse.map(|r| r.price),
                },
            );
        }
        Ok(result)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> PersistenceResult<usize> {
        let mut map = self.records.write();
        let mut removed = 0;
        for rows in map.values_mut() {
            let before = rows.len();
            rows.retain(|r| r.timestamp >= cutoff);
            removed += before - rows.len();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn record(provider: Provider, price: Decimal, at: DateTime<Utc>) -> PriceRecord {
        PriceRecord {
            provider,
            asset: Asset::Gold,
            price,
            bid: None,
            ask: None,
            volume: None,
            timestamp: at,
        }
    }

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn latest_is_per_provider() {
        let store = MemoryStore::new(1000);
        store
            .append(record(Provider::Eodhd, dec!(2050), t(9, 0)))
            .await
            .unwrap();
        store
            .append(record(Provider::TwelveData, dec!(2051), t(9, 1)))
            .await
            .unwrap();
        store
            .append(record(Provider::Eodhd, dec!(2052), t(9, 2)))
            .await
            .unwrap();

        let latest = store.latest(Provider::Eodhd, Asset::Gold).await.unwrap();
        assert_eq!(latest.unwrap().price, dec!(2052));
        let latest = store
            .latest(Provider::TwelveData, Asset::Gold)
            .await
            .unwrap();
        assert_eq!(latest.unwrap().price, dec!(2051));
        assert!(store
            .latest(Provider::Naugold, Asset::Gold)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn window_queries_respect_bounds() {
        let store = MemoryStore::new(1000);
        for (i, h) in [8u32, 9, 10, 11].iter().enumerate() {
            store
                .append(record(
                    Provider::Eodhd,
                    dec!(2000) + Decimal::from(i),
                    t(*h, 0),
                ))
                .await
                .unwrap();
        }

        let first = store.first_after(Asset::Gold, t(9, 0)).await.unwrap();
        assert_eq!(first.unwrap().price, dec!(2001));

        let last = store
            .last_before(Asset::Gold, t(8, 30), t(10, 30))
            .await
            .unwrap();
        assert_eq!(last.unwrap().price, dec!(2002));

        assert!(store
            .last_before(Asset::Gold, t(12, 0), t(13, 0))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn retention_drops_oldest() {
        let store = MemoryStore::new(2);
        for h in [8u32, 9, 10] {
            store
                .append(record(Provider::Eodhd, Decimal::from(h), t(h, 0)))
                .await
                .unwrap();
        }
        assert!(store.first_after(Asset::Gold, t(0, 0)).await.unwrap().unwrap().price > dec!(8));
    }

    #[tokio::test]
    async fn bulk_reference_missing_window_is_none() {
        let store = MemoryStore::new(1000);
        store
            .append(record(Provider::Eodhd, dec!(2050), t(9, 0)))
            .await
            .unwrap();

        let windows = ReferenceWindows {
            open_start: t(8, 0),
            lse_close: t(7, 0),
            lse_search_start: t(5, 0),
            nyse_close: t(10, 0),
            nyse_search_start: t(8, 30),
        };
        let result = store
            .bulk_reference(&[Asset::Gold, Asset::Silver], &windows)
            .await
            .unwrap();

        let gold = &result[&Asset::Gold];
        assert_eq!(gold.today_open, Some(dec!(2050)));
        assert_eq!(gold.lse_close, None);
        assert_eq!(gold.nyse_close, Some(dec!(2050)));
        // No silver data at all: all fields absent, call still succeeds
        assert_eq!(result[&Asset::Silver], ReferencePrices::default());
    }

    #[tokio::test]
    async fn prune_removes_old_rows() {
        let store = MemoryStore::new(1000);
        store
            .append(record(Provider::Eodhd, dec!(1), t(8, 0)))
            .await
            .unwrap();
        store
            .append(record(Provider::Eodhd, dec!(2), t(8, 0) + Duration::hours(3)))
            .await
            .unwrap();
        let removed = store
            .prune_older_than(t(8, 0) + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
