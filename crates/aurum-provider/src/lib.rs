//! Upstream price provider clients.
//!
//! Two generic drivers cover every variant:
//! - `StreamClient<S: StreamSpec>`: one WebSocket connection with
//!   reconnect backoff and a liveness watchdog
//! - `PollClient<P: PollSpec>`: one fetch per interval, a failed poll
//!   never stops the loop
//!
//! Variants only supply their wire protocol (URL, subscribe message,
//! payload parsing); the drivers own lifecycle, health counters, and the
//! normalized `Tick` handoff channel.

pub mod backoff;
pub mod eodhd;
pub mod error;
pub mod health;
pub mod naugold;
pub mod poll;
pub mod stream;
pub mod twelvedata;

pub use backoff::Backoff;
pub use eodhd::EodhdStream;
pub use error::{ProviderError, ProviderResult};
pub use health::{ConnectionHealth, ProviderStatus};
pub use naugold::NaugoldPoll;
pub use poll::{PollClient, PollSpec};
pub use stream::{StreamClient, StreamConfig, StreamSpec};
pub use twelvedata::TwelveDataPoll;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
