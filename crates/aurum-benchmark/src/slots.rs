//! Pure slot arithmetic for the fixing scheduler, kept free of I/O so the
//! calendar edge cases are unit-testable.

use std::collections::HashSet;

use chrono::{DateTime, Days, NaiveDate, Utc};

use aurum_core::MarketCalendar;

/// A concrete future fetch time and the business date its data belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPlan {
    pub at: DateTime<Utc>,
    pub target_date: NaiveDate,
}

/// Maps a slot's UTC date and hour to the business date the published data
/// covers. A slot before the cutover hour carries the previous day's data
/// (the afternoon fixing has already happened by then, but on the prior
/// calendar date).
pub fn target_date_for_slot(utc_date: NaiveDate, hour: u32, cutover_hour: u32) -> NaiveDate {
    if hour >= cutover_hour {
        utc_date
    } else {
        utc_date
            .checked_sub_days(Days::new(1))
            .unwrap_or(utc_date)
    }
}

/// Earliest strictly-future slot worth fetching.
///
/// Skips slots at or before `last_slot`, slots whose target date is not a
/// business day, and slots whose target date is already satisfied. Scans at
/// most ten days ahead; `None` means the caller should fall back to a fixed
/// wait and re-plan.
pub fn next_slot(
    now: DateTime<Utc>,
    last_slot: Option<DateTime<Utc>>,
    satisfied: &HashSet<NaiveDate>,
    calendar: &MarketCalendar,
    slots: &[(u32, u32)],
    cutover_hour: u32,
) -> Option<SlotPlan> {
    for day_offset in 0..10u64 {
        let date = now.date_naive().checked_add_days(Days::new(day_offset))?;
        for &(hour, minute) in slots {
            let Some(at) = date.and_hms_opt(hour, minute, 0).map(|dt| dt.and_utc()) else {
                continue;
            };
            if at <= now {
                continue;
            }
            if last_slot.is_some_and(|last| at <= last) {
                continue;
            }
            let target_date = target_date_for_slot(date, hour, cutover_hour);
            if !calendar.is_business_day(target_date) {
                continue;
            }
            if satisfied.contains(&target_date) {
                continue;
            }
            return Some(SlotPlan { at, target_date });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SLOTS: &[(u32, u32)] = &[(0, 30), (16, 30)];

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn early_slot_targets_previous_date() {
        assert_eq!(target_date_for_slot(date(2025, 6, 3), 0, 8), date(2025, 6, 2));
        assert_eq!(target_date_for_slot(date(2025, 6, 3), 16, 8), date(2025, 6, 3));
    }

    #[test]
    fn next_slot_is_strictly_in_the_future() {
        // Monday 2025-06-02, just past the 00:30 slot.
        let plan = next_slot(
            utc(2025, 6, 2, 0, 31),
            None,
            &HashSet::new(),
            &MarketCalendar::uk(),
            SLOTS,
            8,
        )
        .unwrap();
        assert_eq!(plan.at, utc(2025, 6, 2, 16, 30));
        assert_eq!(plan.target_date, date(2025, 6, 2));
    }

    #[test]
    fn weekend_target_dates_are_skipped() {
        // Friday evening with Friday's data already fetched: the remaining
        // weekend slots all target non-business dates (Monday's 00:30 slot
        // targets Sunday), so the next fetch is Monday 16:30.
        let mut satisfied = HashSet::new();
        satisfied.insert(date(2025, 6, 6));
        let plan = next_slot(
            utc(2025, 6, 6, 17, 0),
            None,
            &satisfied,
            &MarketCalendar::uk(),
            SLOTS,
            8,
        )
        .unwrap();
        assert_eq!(plan.at, utc(2025, 6, 9, 16, 30));
        assert_eq!(plan.target_date, date(2025, 6, 9));
    }

    #[test]
    fn satisfied_date_skips_backup_slot() {
        // 2025-06-02 fetched at 16:30; the 00:30 backup next morning targets
        // the same date and is skipped.
        let mut satisfied = HashSet::new();
        satisfied.insert(date(2025, 6, 2));
        let plan = next_slot(
            utc(2025, 6, 2, 17, 0),
            None,
            &satisfied,
            &MarketCalendar::uk(),
            SLOTS,
            8,
        )
        .unwrap();
        assert_eq!(plan.at, utc(2025, 6, 3, 16, 30));
        assert_eq!(plan.target_date, date(2025, 6, 3));
    }

    #[test]
    fn uk_holiday_is_never_targeted() {
        // 2025-12-25 and 12-26 are bank holidays. With Christmas Eve already
        // satisfied, the scan crosses the holidays and the weekend and lands
        // on Monday the 29th.
        let mut satisfied = HashSet::new();
        satisfied.insert(date(2025, 12, 24));
        let plan = next_slot(
            utc(2025, 12, 24, 17, 0),
            None,
            &satisfied,
            &MarketCalendar::uk(),
            SLOTS,
            8,
        )
        .unwrap();
        assert_eq!(plan.at, utc(2025, 12, 29, 16, 30));
        assert_eq!(plan.target_date, date(2025, 12, 29));
    }

    #[test]
    fn exhausted_scan_returns_none() {
        let satisfied: HashSet<NaiveDate> = (0..12)
            .filter_map(|i| date(2025, 6, 1).checked_add_days(Days::new(i)))
            .collect();
        assert!(next_slot(
            utc(2025, 6, 1, 0, 0),
            None,
            &satisfied,
            &MarketCalendar::uk(),
            SLOTS,
            8,
        )
        .is_none());
    }
}
