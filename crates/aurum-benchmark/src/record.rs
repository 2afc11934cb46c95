//! Shared benchmark state written by the schedulers, read by the HTTP layer.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

/// One business day's benchmark fixings. `fields` holds whatever the
/// upstream reported (e.g. `gold_am`, `gold_pm`, `silver`); a partial
/// response merges into the existing map rather than replacing it.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkRecord {
    pub business_date: NaiveDate,
    pub fields: BTreeMap<String, Decimal>,
    pub fetched_at: DateTime<Utc>,
}

/// The day's first-announced USD/KRW rate.
#[derive(Debug, Clone, Serialize)]
pub struct DailyRate {
    pub rate: Decimal,
    pub business_date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

/// Latest benchmark values. Both schedulers write here; readers get clones
/// and never observe a half-applied update.
#[derive(Debug, Default)]
pub struct BenchmarkState {
    fixing: RwLock<Option<BenchmarkRecord>>,
    daily_rate: RwLock<Option<DailyRate>>,
}

impl BenchmarkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge newly fetched fixing fields for `business_date`. A fetch for a
    /// new date replaces the record; a fetch for the same date only overlays
    /// the reported fields.
    pub fn merge_fixing(
        &self,
        business_date: NaiveDate,
        fields: BTreeMap<String, Decimal>,
        fetched_at: DateTime<Utc>,
    ) {
        let mut guard = self.fixing.write();
        match guard.as_mut() {
            Some(record) if record.business_date == business_date => {
                record.fields.extend(fields);
                record.fetched_at = fetched_at;
            }
            _ => {
                *guard = Some(BenchmarkRecord {
                    business_date,
                    fields,
                    fetched_at,
                });
            }
        }
    }

    pub fn set_daily_rate(&self, rate: Decimal, business_date: NaiveDate, fetched_at: DateTime<Utc>) {
        *self.daily_rate.write() = Some(DailyRate {
            rate,
            business_date,
            fetched_at,
        });
    }

    pub fn fixing(&self) -> Option<BenchmarkRecord> {
        self.fixing.read().clone()
    }

    pub fn daily_rate(&self) -> Option<DailyRate> {
        self.daily_rate.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn same_date_fetch_merges_fields() {
        let state = BenchmarkState::new();
        let mut first = BTreeMap::new();
        first.insert("gold_am".to_string(), dec!(2050.10));
        state.merge_fixing(date(2025, 6, 2), first, Utc::now());

        let mut second = BTreeMap::new();
        second.insert("gold_pm".to_string(), dec!(2052.35));
        state.merge_fixing(date(2025, 6, 2), second, Utc::now());

        let record = state.fixing().unwrap();
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.fields["gold_am"], dec!(2050.10));
        assert_eq!(record.fields["gold_pm"], dec!(2052.35));
    }

    #[test]
    fn new_date_replaces_record() {
        let state = BenchmarkState::new();
        let mut first = BTreeMap::new();
        first.insert("gold_am".to_string(), dec!(2050));
        state.merge_fixing(date(2025, 6, 2), first, Utc::now());

        let mut second = BTreeMap::new();
        second.insert("silver".to_string(), dec!(23.4));
        state.merge_fixing(date(2025, 6, 3), second, Utc::now());

        let record = state.fixing().unwrap();
        assert_eq!(record.business_date, date(2025, 6, 3));
        assert!(!record.fields.contains_key("gold_am"));
    }
}
