//! Provider error types.
//!
//! None of these are fatal to the owning client: connection errors feed
//! the reconnect loop, protocol errors drop the message and keep the
//! connection.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("No inbound message within watchdog timeout")]
    WatchdogTimeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Upstream HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tick receiver dropped")]
    ChannelClosed,
}

pub type ProviderResult<T> = Result<T, ProviderError>;
