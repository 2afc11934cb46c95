//! Per-client connection health.
//!
//! Each client owns exactly one `ConnectionHealth` and is its only writer;
//! the status surface takes read-only snapshots.

use aurum_core::Provider;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct Timestamps {
    last_message_at: Option<DateTime<Utc>>,
    current_backoff: Duration,
}

/// Live health state of one provider client.
#[derive(Debug, Default)]
pub struct ConnectionHealth {
    running: AtomicBool,
    connected: AtomicBool,
    message_count: AtomicU64,
    error_count: AtomicU64,
    timestamps: RwLock<Timestamps>,
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn record_message(&self) {
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.timestamps.write().last_message_at = Some(Utc::now());
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_backoff(&self, delay: Duration) {
        self.timestamps.write().current_backoff = delay;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Read-only snapshot for the status surface.
    pub fn status(&self, provider: Provider) -> ProviderStatus {
        let ts = self.timestamps.read();
        ProviderStatus {
            provider,
            running: self.is_running(),
            connected: self.is_connected(),
            message_count: self.message_count(),
            error_count: self.error_count(),
            seconds_since_last_message: ts
                .last_message_at
                .map(|t| (Utc::now() - t).num_seconds().max(0)),
            current_backoff_ms: ts.current_backoff.as_millis() as u64,
        }
    }
}

/// Point-in-time provider health, reported on `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub provider: Provider,
    pub running: bool,
    pub connected: bool,
    pub message_count: u64,
    pub error_count: u64,
    /// None until the first message arrives.
    pub seconds_since_last_message: Option<i64>,
    pub current_backoff_ms: u64,
}
