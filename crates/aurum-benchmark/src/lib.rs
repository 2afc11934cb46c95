//! Calendar-aware benchmark fetchers.
//!
//! Two schedulers live here: the LBMA fixing fetch (a handful of API calls
//! per month, slot-driven) and the first-announced USD/KRW rate (one value
//! per Korean business morning). Both publish into a shared
//! [`BenchmarkState`] read by the HTTP layer.

mod daily_rate;
mod error;
mod fixing;
mod record;
mod slots;

pub use daily_rate::{DailyRateConfig, DailyRateScheduler, RateSource, SmbsSource};
pub use error::{BenchmarkError, BenchmarkResult};
pub use fixing::{FixingConfig, FixingScheduler, FixingSource, MetalsDevSource};
pub use record::{BenchmarkRecord, BenchmarkState, DailyRate};
pub use slots::{next_slot, target_date_for_slot, SlotPlan};
