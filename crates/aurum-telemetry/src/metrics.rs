//! Prometheus metrics for the price pipeline.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means a duplicate metric name, which is a programming error that should
//! crash at startup rather than fail silently. These panics only occur
//! during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_int_counter, register_int_gauge,
    CounterVec, GaugeVec, IntCounter, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Per-provider connection state (1 = connected).
pub static PROVIDER_CONNECTED: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "aurum_provider_connected",
        "Provider connection state (1=connected)",
        &["provider"]
    )
    .unwrap()
});

/// Ticks received from upstream, before aggregation.
pub static TICKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aurum_ticks_total",
        "Raw ticks received per provider",
        &["provider"]
    )
    .unwrap()
});

/// Provider-level errors (parse failures, disconnects, upstream errors).
pub static PROVIDER_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aurum_provider_errors_total",
        "Provider errors per provider",
        &["provider"]
    )
    .unwrap()
});

/// Snapshots emitted per window, after suppression.
pub static SNAPSHOTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aurum_snapshots_total",
        "Aggregated snapshots emitted per provider",
        &["provider"]
    )
    .unwrap()
});

/// Reconnect attempts per streaming provider.
pub static RECONNECTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aurum_reconnects_total",
        "Stream reconnect attempts per provider",
        &["provider"]
    )
    .unwrap()
});

/// Events evicted from full subscriber queues.
pub static BROADCAST_DROPS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "aurum_broadcast_drops_total",
        "Events dropped from full subscriber queues"
    )
    .unwrap()
});

/// Currently connected stream subscribers.
pub static SUBSCRIBERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("aurum_subscribers", "Connected stream subscribers").unwrap()
});

/// Convenience facade so call sites do not touch label plumbing.
pub struct Metrics;

impl Metrics {
    pub fn provider_connected(provider: &str) {
        PROVIDER_CONNECTED.with_label_values(&[provider]).set(1.0);
    }

    pub fn provider_disconnected(provider: &str) {
        PROVIDER_CONNECTED.with_label_values(&[provider]).set(0.0);
    }

    pub fn tick_received(provider: &str) {
        TICKS_TOTAL.with_label_values(&[provider]).inc();
    }

    pub fn provider_error(provider: &str) {
        PROVIDER_ERRORS_TOTAL.with_label_values(&[provider]).inc();
    }

    pub fn provider_reconnect(provider: &str) {
        RECONNECTS_TOTAL.with_label_values(&[provider]).inc();
    }

    pub fn broadcast_drop() {
        BROADCAST_DROPS_TOTAL.inc();
    }

    pub fn snapshot_emitted(provider: &str) {
        SNAPSHOTS_TOTAL.with_label_values(&[provider]).inc();
    }

    pub fn subscribers(count: i64) {
        SUBSCRIBERS.set(count);
    }
}

/// Render all registered metrics in the Prometheus text format.
pub fn export() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&prometheus::gather())
        .map_err(|e| TelemetryError::Metrics(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_includes_registered_metrics() {
        Metrics::tick_received("eodhd");
        Metrics::provider_connected("eodhd");
        Metrics::provider_reconnect("eodhd");
        Metrics::broadcast_drop();
        let text = export().unwrap();
        assert!(text.contains("aurum_ticks_total"));
        assert!(text.contains("aurum_provider_connected"));
        assert!(text.contains("aurum_reconnects_total"));
        assert!(text.contains("aurum_broadcast_drops_total"));
    }
}
