//! Time-window aggregation of raw provider ticks.
//!
//! Ticks stream in continuously from provider clients; snapshots leave on a
//! fixed cadence. Each (provider, asset) key keeps an independent buffer so a
//! quiet pair never delays a busy one, and the unchanged-price suppression is
//! also tracked per key.

mod aggregator;
mod buffer;

pub use aggregator::{run_aggregator, Aggregator, AggregatorConfig, SuppressPolicy};
pub use buffer::SampleBuffer;
