//! Generic polling client.
//!
//! Same lifecycle discipline as the stream client, but each iteration is
//! one atomic fetch instead of receive-next-frame. A failed poll never
//! stops the loop.

use crate::backoff::jitter;
use crate::error::ProviderResult;
use crate::health::ConnectionHealth;
use async_trait::async_trait;
use aurum_core::Tick;
use aurum_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wire protocol of one polling provider.
#[async_trait]
pub trait PollSpec: Send + 'static {
    fn provider(&self) -> aurum_core::Provider;

    /// Time between poll iterations.
    fn interval(&self) -> Duration;

    /// Maximum random addition to each sleep, zero to disable.
    fn max_jitter(&self) -> Duration {
        Duration::ZERO
    }

    /// One atomic fetch. An empty vec is a normal quiet iteration.
    async fn poll(&mut self, http: &reqwest::Client) -> ProviderResult<Vec<Tick>>;
}

/// Generic poll-loop client for one provider.
pub struct PollClient<P: PollSpec> {
    spec: P,
    http: reqwest::Client,
    health: Arc<ConnectionHealth>,
    tick_tx: mpsc::Sender<Tick>,
    shutdown: CancellationToken,
}

impl<P: PollSpec> PollClient<P> {
    pub fn new(spec: P, tick_tx: mpsc::Sender<Tick>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            spec,
            http,
            health: Arc::new(ConnectionHealth::new()),
            tick_tx,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn health(&self) -> Arc<ConnectionHealth> {
        self.health.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the poll loop until shutdown.
    pub async fn run(&mut self) -> ProviderResult<()> {
        let provider = self.spec.provider();
        info!(
            %provider,
            interval_s = self.spec.interval().as_secs(),
            "Starting poll client"
        );
        self.health.set_running(true);
        // A poll client is "connected" for as long as it is running; the
        // error counter tells failed iterations apart.
        self.health.set_connected(true);
        Metrics::provider_connected(provider.as_str());

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.spec.poll(&self.http).await {
                Ok(ticks) => {
                    if !ticks.is_empty() {
                        debug!(%provider, count = ticks.len(), "Poll produced ticks");
                    }
                    for tick in ticks {
                        self.health.record_message();
                        Metrics::tick_received(provider.as_str());
                        if self.tick_tx.send(tick).await.is_err() {
                            warn!(%provider, "Tick receiver dropped, stopping poll loop");
                            self.teardown();
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    self.health.record_error();
                    Metrics::provider_error(provider.as_str());
                    warn!(%provider, error = %e, "Poll failed");
                }
            }

            let sleep = self.spec.interval() + jitter(self.spec.max_jitter());
            tokio::select! {
                () = tokio::time::sleep(sleep) => {}
                () = self.shutdown.cancelled() => break,
            }
        }

        self.teardown();
        info!(%provider, "Poll client stopped");
        Ok(())
    }

    fn teardown(&self) {
        self.health.set_connected(false);
        self.health.set_running(false);
        Metrics::provider_disconnected(self.spec.provider().as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use aurum_core::{Asset, Provider};
    use rust_decimal_macros::dec;

    struct CountingSpec {
        polls: u32,
    }

    #[async_trait]
    impl PollSpec for CountingSpec {
        fn provider(&self) -> Provider {
            Provider::TwelveData
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(5)
        }

        async fn poll(&mut self, _http: &reqwest::Client) -> ProviderResult<Vec<Tick>> {
            self.polls += 1;
            match self.polls {
                // Second iteration fails; the loop must keep going.
                2 => Err(ProviderError::Protocol("boom".into())),
                _ => Ok(vec![Tick::new(
                    Provider::TwelveData,
                    Asset::Silver,
                    dec!(23.5),
                )]),
            }
        }
    }

    #[tokio::test]
    async fn failed_poll_does_not_stop_the_loop() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut client = PollClient::new(CountingSpec { polls: 0 }, tx);
        let token = client.shutdown_token();
        let health = client.health();

        let runner = tokio::spawn(async move { client.run().await });

        // Wait until ticks from iterations after the failure arrive.
        let first = rx.recv().await.unwrap();
        assert_eq!(first.asset, Asset::Silver);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.asset, Asset::Silver);

        token.cancel();
        runner.await.unwrap().unwrap();
        assert_eq!(health.error_count(), 1);
        assert!(health.message_count() >= 2);
        assert!(!health.is_running());
    }
}
