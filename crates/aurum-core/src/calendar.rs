//! Business-day calendars.
//!
//! A business day is a weekday that is not in the calendar's holiday table.
//! Holiday tables are static input data, updated annually, not computed.

use chrono::{Datelike, NaiveDate, Weekday};

/// UK bank holidays, 2025-2027. Governs the LBMA fixing schedule.
pub const UK_HOLIDAYS: &[(i32, u32, u32)] = &[
    // 2025
    (2025, 1, 1),
    (2025, 4, 18),
    (2025, 4, 21),
    (2025, 5, 5),
    (2025, 5, 26),
    (2025, 8, 25),
    (2025, 12, 25),
    (2025, 12, 26),
    // 2026
    (2026, 1, 1),
    (2026, 4, 3),
    (2026, 4, 6),
    (2026, 5, 4),
    (2026, 5, 25),
    (2026, 8, 31),
    (2026, 12, 25),
    (2026, 12, 28),
    // 2027
    (2027, 1, 1),
    (2027, 3, 26),
    (2027, 3, 29),
    (2027, 5, 3),
    (2027, 5, 31),
    (2027, 8, 30),
    (2027, 12, 27),
    (2027, 12, 28),
];

/// Korean public holidays, 2025-2027. Governs the daily USD/KRW fetch.
pub const KR_HOLIDAYS: &[(i32, u32, u32)] = &[
    // 2025
    (2025, 1, 1),
    (2025, 1, 28),
    (2025, 1, 29),
    (2025, 1, 30),
    (2025, 3, 1),
    (2025, 5, 5),
    (2025, 5, 6),
    (2025, 6, 6),
    (2025, 8, 15),
    (2025, 10, 3),
    (2025, 10, 6),
    (2025, 10, 7),
    (2025, 10, 8),
    (2025, 10, 9),
    (2025, 12, 25),
    // 2026
    (2026, 1, 1),
    (2026, 2, 16),
    (2026, 2, 17),
    (2026, 2, 18),
    (2026, 3, 2),
    (2026, 5, 5),
    (2026, 5, 24),
    (2026, 6, 6),
    (2026, 8, 17),
    (2026, 9, 24),
    (2026, 9, 25),
    (2026, 9, 26),
    (2026, 10, 3),
    (2026, 10, 9),
    (2026, 12, 25),
    // 2027
    (2027, 1, 1),
    (2027, 2, 5),
    (2027, 2, 6),
    (2027, 2, 7),
    (2027, 2, 8),
    (2027, 3, 1),
    (2027, 5, 5),
    (2027, 5, 13),
    (2027, 6, 7),
    (2027, 8, 16),
    (2027, 10, 3),
    (2027, 10, 4),
    (2027, 10, 14),
    (2027, 10, 15),
    (2027, 10, 16),
    (2027, 12, 25),
];

/// Weekday + holiday-table business-day check.
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    holidays: Vec<NaiveDate>,
}

impl MarketCalendar {
    pub fn new(holidays: &[(i32, u32, u32)]) -> Self {
        let holidays = holidays
            .iter()
            .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
            .collect();
        Self { holidays }
    }

    /// UK calendar (LBMA fixing).
    pub fn uk() -> Self {
        Self::new(UK_HOLIDAYS)
    }

    /// Korean calendar (daily FX rate).
    pub fn kr() -> Self {
        Self::new(KR_HOLIDAYS)
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Most recent business day on or before `date`. Falls back to `date`
    /// itself if nothing is found within ten days (cannot happen with a
    /// sane holiday table).
    pub fn last_business_day(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date;
        for _ in 0..10 {
            if self.is_business_day(d) {
                return d;
            }
            d = d.pred_opt().unwrap_or(d);
        }
        date
    }
}
