//! Generic streaming client.
//!
//! One `StreamClient` drives one WebSocket connection through the
//! Stopped -> Starting -> Connected -> Reconnecting lifecycle. Variants
//! implement `StreamSpec` and never touch the transport.

use crate::backoff::{jitter, Backoff};
use crate::error::{ProviderError, ProviderResult};
use crate::health::ConnectionHealth;
use aurum_core::Tick;
use aurum_telemetry::Metrics;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Wire protocol of one streaming provider.
pub trait StreamSpec: Send + Sync + 'static {
    fn provider(&self) -> aurum_core::Provider;

    fn url(&self) -> String;

    /// Message to send right after the connection opens, if any.
    fn subscribe_message(&self) -> Option<String>;

    /// Parse one raw frame into zero or more ticks.
    ///
    /// Control/status/heartbeat frames yield `Ok(vec![])`; they are not
    /// errors. An `Err` means the payload was malformed; the driver logs
    /// it, bumps the error counter, and keeps the connection.
    fn parse(&self, raw: &str) -> ProviderResult<Vec<Tick>>;
}

/// Stream client configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Base delay for exponential reconnect backoff.
    pub reconnect_base_delay: Duration,
    /// Cap for the reconnect backoff.
    pub reconnect_max_delay: Duration,
    /// Force-close the transport if no inbound frame arrives within this
    /// while connected.
    pub watchdog_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(60),
            watchdog_timeout: Duration::from_secs(60),
        }
    }
}

/// Generic WebSocket client for one provider.
pub struct StreamClient<S: StreamSpec> {
    spec: S,
    config: StreamConfig,
    health: Arc<ConnectionHealth>,
    tick_tx: mpsc::Sender<Tick>,
    shutdown: CancellationToken,
    started: AtomicBool,
}

impl<S: StreamSpec> StreamClient<S> {
    pub fn new(spec: S, config: StreamConfig, tick_tx: mpsc::Sender<Tick>) -> Self {
        Self {
            spec,
            config,
            health: Arc::new(ConnectionHealth::new()),
            tick_tx,
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn health(&self) -> Arc<ConnectionHealth> {
        self.health.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal shutdown. The run loop closes the transport and returns
    /// once fully torn down.
    pub fn shutdown(&self) {
        info!(provider = %self.spec.provider(), "Stream client shutdown requested");
        self.shutdown.cancel();
    }

    /// Run the lifecycle loop until shutdown. Idempotent: a second call
    /// while already running returns immediately.
    pub async fn run(&self) -> ProviderResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!(provider = %self.spec.provider(), "Stream client already running");
            return Ok(());
        }

        let provider = self.spec.provider();
        info!(%provider, "Starting stream client");
        self.health.set_running(true);

        let mut backoff = Backoff::new(
            self.config.reconnect_base_delay,
            self.config.reconnect_max_delay,
        );

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let session_result = self.session(&mut backoff).await;
            self.health.set_connected(false);
            Metrics::provider_disconnected(provider.as_str());

            match session_result {
                Ok(()) => info!(%provider, "Connection closed"),
                // No consumer left; reconnecting would stream into a void.
                Err(ProviderError::ChannelClosed) => {
                    warn!(%provider, "Tick receiver dropped, stopping stream client");
                    break;
                }
                Err(e) => error!(%provider, error = %e, "Connection error"),
            }

            if self.shutdown.is_cancelled() {
                break;
            }

            let delay = backoff.next_delay();
            self.health.set_backoff(delay);
            let sleep = delay + jitter(Duration::from_millis(1000));
            Metrics::provider_reconnect(provider.as_str());
            warn!(%provider, delay_ms = sleep.as_millis(), "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(sleep) => {}
                () = self.shutdown.cancelled() => break,
            }
        }

        self.health.set_running(false);
        self.started.store(false, Ordering::SeqCst);
        info!(%provider, "Stream client stopped");
        Ok(())
    }

    /// One connection attempt plus its message loop.
    async fn session(&self, backoff: &mut Backoff) -> ProviderResult<()> {
        let provider = self.spec.provider();
        let url = self.spec.url();
        info!(%provider, "Connecting");

        let (ws_stream, _response) = connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        self.health.set_connected(true);
        Metrics::provider_connected(provider.as_str());
        backoff.reset();
        self.health.set_backoff(self.config.reconnect_base_delay);
        info!(%provider, "Connected");

        if let Some(msg) = self.spec.subscribe_message() {
            write.send(Message::Text(msg.into())).await?;
            debug!(%provider, "Subscribe message sent");
        }

        // Watchdog: guards against connections that stay open but go
        // silent. Checked at half the timeout interval.
        let mut last_frame = Instant::now();
        let check_interval = self.config.watchdog_timeout / 2;

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(%provider, ?e, "Failed to send close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_frame = Instant::now();
                            self.handle_frame(&text).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            last_frame = Instant::now();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_frame = Instant::now();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(%provider, code, %reason, "Closed by server");
                            return Err(ProviderError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(%provider, ?e, "Read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!(%provider, "Stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                () = tokio::time::sleep(check_interval) => {
                    if last_frame.elapsed() > self.config.watchdog_timeout {
                        error!(
                            %provider,
                            silent_for_s = last_frame.elapsed().as_secs(),
                            "Watchdog timeout, force-closing transport"
                        );
                        let _ = write.send(Message::Close(None)).await;
                        return Err(ProviderError::WatchdogTimeout);
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, text: &str) -> ProviderResult<()> {
        match self.spec.parse(text) {
            Ok(ticks) => {
                for tick in ticks {
                    self.health.record_message();
                    Metrics::tick_received(self.spec.provider().as_str());
                    if self.tick_tx.send(tick).await.is_err() {
                        warn!(provider = %self.spec.provider(), "Tick receiver dropped");
                        return Err(ProviderError::ChannelClosed);
                    }
                }
            }
            Err(e) => {
                self.health.record_error();
                Metrics::provider_error(self.spec.provider().as_str());
                warn!(provider = %self.spec.provider(), error = %e, "Dropped malformed frame");
                debug!(raw = %text.get(..200).unwrap_or(text), "Offending frame");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurum_core::{Asset, Provider};
    use rust_decimal_macros::dec;

    struct FakeSpec;

    impl StreamSpec for FakeSpec {
        fn provider(&self) -> Provider {
            Provider::Eodhd
        }

        fn url(&self) -> String {
            // Unroutable: connection attempts fail immediately in tests.
            "ws://127.0.0.1:1/ws".to_string()
        }

        fn subscribe_message(&self) -> Option<String> {
            None
        }

        fn parse(&self, raw: &str) -> ProviderResult<Vec<Tick>> {
            if raw == "bad" {
                return Err(ProviderError::Protocol("bad".into()));
            }
            Ok(vec![Tick::new(Provider::Eodhd, Asset::Gold, dec!(2050))])
        }
    }

    #[tokio::test]
    async fn malformed_frame_increments_error_and_continues() {
        let (tx, mut rx) = mpsc::channel(8);
        let client = StreamClient::new(FakeSpec, StreamConfig::default(), tx);

        client.handle_frame("bad").await.unwrap();
        assert_eq!(client.health.error_count(), 1);
        assert_eq!(client.health.message_count(), 0);

        client.handle_frame("ok").await.unwrap();
        assert_eq!(client.health.message_count(), 1);
        assert_eq!(rx.recv().await.unwrap().asset, Asset::Gold);
    }

    #[tokio::test]
    async fn shutdown_stops_run_loop() {
        let (tx, _rx) = mpsc::channel(8);
        let client = Arc::new(StreamClient::new(
            FakeSpec,
            StreamConfig {
                reconnect_base_delay: Duration::from_millis(10),
                reconnect_max_delay: Duration::from_millis(50),
                watchdog_timeout: Duration::from_secs(1),
            },
            tx,
        ));

        let runner = {
            let client = client.clone();
            tokio::spawn(async move { client.run().await })
        };

        // Let it fail a couple of connection attempts, then stop.
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("run loop should exit after shutdown")
            .unwrap();
        assert!(result.is_ok());
        assert!(!client.health.is_running());
    }
}
