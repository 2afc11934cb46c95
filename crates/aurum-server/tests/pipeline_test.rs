//! End-to-end pipeline integration tests.
//!
//! Drives the tick -> aggregator -> snapshot -> hub -> SSE path through the
//! public crate APIs, the same way `Application::run` wires it, and checks
//! that persisted rows and streamed frames agree.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use aurum_aggregate::{run_aggregator, Aggregator, AggregatorConfig, SuppressPolicy};
use aurum_broadcast::{sse, Event, Hub, HubConfig};
use aurum_core::{Asset, Provider, Tick};
use aurum_persistence::{MemoryStore, PriceRecord, PriceStore};

fn fast_aggregator() -> Arc<Aggregator> {
    Arc::new(Aggregator::new(AggregatorConfig {
        window: Duration::from_millis(100),
        suppress: SuppressPolicy::default(),
    }))
}

/// Ticks fed into the aggregator surface as one averaged snapshot on a live
/// subscription and as a queryable row in the store.
#[tokio::test]
async fn ticks_flow_to_subscriber_and_store() {
    let shutdown = CancellationToken::new();
    let (tick_tx, tick_rx) = mpsc::channel::<Tick>(64);
    let (snapshot_tx, mut snapshot_rx) = mpsc::channel(64);

    let aggregator = fast_aggregator();
    let agg_task = tokio::spawn(run_aggregator(
        Arc::clone(&aggregator),
        tick_rx,
        snapshot_tx,
        shutdown.clone(),
    ));

    let hub = Arc::new(Hub::new(HubConfig::default()));
    let store = Arc::new(MemoryStore::new(1000));
    let mut subscription = hub.subscribe();

    // Same fan-out shape as the server wiring: drain the flush as one
    // batch, publish each snapshot, persist the batch.
    let fan_hub = Arc::clone(&hub);
    let fan_store: Arc<dyn PriceStore> = store.clone();
    let fan_task = tokio::spawn(async move {
        let mut batch = Vec::with_capacity(64);
        while snapshot_rx.recv_many(&mut batch, 64).await > 0 {
            for snapshot in &batch {
                fan_hub.publish(snapshot);
            }
            let records: Vec<PriceRecord> = batch.iter().map(PriceRecord::from).collect();
            let _ = fan_store.append_batch(records).await;
            batch.clear();
        }
    });

    for price in [dec!(2050.0), dec!(2050.2), dec!(2050.4)] {
        tick_tx
            .send(Tick::new(Provider::Eodhd, Asset::Gold, price))
            .await
            .unwrap();
    }

    let event = timeout(Duration::from_secs(2), subscription.next_event())
        .await
        .expect("snapshot should arrive within the window");
    let Event::Snapshot(stream_event) = event else {
        panic!("expected a snapshot before any heartbeat");
    };
    assert_eq!(stream_event.source, "eodhd");
    assert_eq!(stream_event.asset, "gold");
    assert_eq!(stream_event.price, 2050.2);
    assert_eq!(stream_event.sample_count, 3);

    let frame = sse::frame(&Event::Snapshot(stream_event));
    assert!(frame.starts_with("data: {"));
    assert!(frame.ends_with("\n\n"));

    let stored = store
        .latest(Provider::Eodhd, Asset::Gold)
        .await
        .unwrap()
        .expect("fan-out should have persisted the snapshot");
    assert_eq!(stored.price, dec!(2050.2));

    shutdown.cancel();
    drop(tick_tx);
    let _ = timeout(Duration::from_secs(2), agg_task).await;
    drop(hub);
    let _ = timeout(Duration::from_secs(2), fan_task).await;
}

/// Shutdown flushes buffered samples instead of discarding them, so the last
/// partial window still reaches downstream consumers.
#[tokio::test]
async fn shutdown_flushes_buffered_window() {
    let shutdown = CancellationToken::new();
    let (tick_tx, tick_rx) = mpsc::channel::<Tick>(8);
    let (snapshot_tx, mut snapshot_rx) = mpsc::channel(8);

    // Window far longer than the test so only the final flush can emit.
    let aggregator = Arc::new(Aggregator::new(AggregatorConfig {
        window: Duration::from_secs(600),
        suppress: SuppressPolicy::default(),
    }));
    let agg_task = tokio::spawn(run_aggregator(
        Arc::clone(&aggregator),
        tick_rx,
        snapshot_tx,
        shutdown.clone(),
    ));

    tick_tx
        .send(Tick::new(Provider::TwelveData, Asset::Silver, dec!(24.5)))
        .await
        .unwrap();
    // Give the aggregator loop a chance to buffer the tick before cancelling.
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    let snapshot = timeout(Duration::from_secs(2), snapshot_rx.recv())
        .await
        .expect("final flush should emit promptly")
        .expect("channel should carry the flushed snapshot");
    assert_eq!(snapshot.asset, Asset::Silver);
    assert_eq!(snapshot.price, dec!(24.5));
    assert_eq!(snapshot.sample_count, 1);

    let _ = timeout(Duration::from_secs(2), agg_task).await;
}
