//! Core domain types for the aurum price pipeline.
//!
//! This crate provides the types shared by every stage of the pipeline:
//! - `Provider`, `Asset`: identity of a price observation
//! - `Tick`, `Snapshot`: raw and aggregated price samples
//! - `MarketCalendar`: business-day checks against static holiday tables
//! - `Clock`: injectable time source for deterministic tests

pub mod asset;
pub mod calendar;
pub mod clock;
pub mod error;
pub mod tick;

pub use asset::{Asset, Provider};
pub use calendar::{MarketCalendar, KR_HOLIDAYS, UK_HOLIDAYS};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CoreError, Result};
pub use tick::{Snapshot, Tick};

use chrono::FixedOffset;

/// Korean Standard Time (UTC+9), the timezone of the outbound stream.
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("KST offset is valid")
}
