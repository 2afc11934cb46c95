use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use aurum_core::Snapshot;
use aurum_telemetry::Metrics;

use crate::events::{Event, StreamEvent};

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Per-subscriber queue depth. When full, the oldest queued event is
    /// discarded to make room for the newest one.
    pub queue_capacity: usize,
    /// How long a subscriber waits for an event before a heartbeat is
    /// returned instead.
    pub heartbeat: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            heartbeat: Duration::from_secs(15),
        }
    }
}

struct SubscriberQueue {
    events: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue one event, evicting the oldest entry when full. Returns true
    /// if an event was evicted.
    fn push(&self, event: Event) -> bool {
        let mut events = self.events.lock();
        let mut dropped = false;
        if events.len() >= self.capacity {
            events.pop_front();
            dropped = true;
        }
        events.push_back(event);
        drop(events);
        self.notify.notify_one();
        dropped
    }

    fn pop(&self) -> Option<Event> {
        self.events.lock().pop_front()
    }
}

/// Fan-out point between the aggregator and streaming clients.
///
/// Publishing never blocks: each subscriber has its own bounded queue, and a
/// queue that cannot keep up sheds its own oldest events.
pub struct Hub {
    subscribers: DashMap<Uuid, Arc<SubscriberQueue>>,
    config: HubConfig,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            subscribers: DashMap::new(),
            config,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Register a new subscriber. The returned handle unregisters itself on
    /// drop, so a disconnected HTTP client cleans up without hub involvement.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = Uuid::new_v4();
        let queue = Arc::new(SubscriberQueue::new(self.config.queue_capacity));
        self.subscribers.insert(id, Arc::clone(&queue));
        debug!(subscriber = %id, total = self.subscribers.len(), "subscriber registered");
        Subscription {
            id,
            queue,
            heartbeat: self.config.heartbeat,
            hub: Arc::clone(self),
        }
    }

    /// Deliver one snapshot to every subscriber. Returns the number of
    /// queues written to.
    pub fn publish(&self, snapshot: &Snapshot) -> usize {
        let event = StreamEvent::from(snapshot);
        let mut delivered = 0;
        for entry in self.subscribers.iter() {
            if entry.value().push(Event::Snapshot(event.clone())) {
                Metrics::broadcast_drop();
                warn!(subscriber = %entry.key(), "subscriber queue full, oldest event dropped");
            }
            delivered += 1;
        }
        delivered
    }

    fn unregister(&self, id: Uuid) {
        self.subscribers.remove(&id);
        debug!(subscriber = %id, total = self.subscribers.len(), "subscriber removed");
    }
}

/// One subscriber's end of the hub.
pub struct Subscription {
    id: Uuid,
    queue: Arc<SubscriberQueue>,
    heartbeat: Duration,
    hub: Arc<Hub>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event, yielding [`Event::Heartbeat`] if nothing
    /// arrives within the heartbeat interval.
    pub async fn next_event(&mut self) -> Event {
        loop {
            if let Some(event) = self.queue.pop() {
                return event;
            }
            if tokio::time::timeout(self.heartbeat, self.queue.notify.notified())
                .await
                .is_err()
            {
                return Event::Heartbeat;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurum_core::{Asset, Provider};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn snapshot(price: Decimal) -> Snapshot {
        Snapshot {
            provider: Provider::Eodhd,
            asset: Asset::Gold,
            price,
            bid: None,
            ask: None,
            volume: None,
            sample_count: 1,
            timestamp: Utc::now(),
            meta: None,
        }
    }

    fn hub_with_capacity(capacity: usize) -> Arc<Hub> {
        Arc::new(Hub::new(HubConfig {
            queue_capacity: capacity,
            heartbeat: Duration::from_secs(15),
        }))
    }

    #[tokio::test]
    async fn slow_subscriber_keeps_newest_events() {
        let hub = hub_with_capacity(2);
        let mut sub = hub.subscribe();

        let drops_before = aurum_telemetry::metrics::BROADCAST_DROPS_TOTAL.get();
        hub.publish(&snapshot(dec!(1)));
        hub.publish(&snapshot(dec!(2)));
        hub.publish(&snapshot(dec!(3)));

        let Event::Snapshot(first) = sub.next_event().await else {
            panic!("expected snapshot");
        };
        let Event::Snapshot(second) = sub.next_event().await else {
            panic!("expected snapshot");
        };
        assert_eq!(first.price, 2.0, "oldest event was evicted");
        assert_eq!(second.price, 3.0);
        assert_eq!(
            aurum_telemetry::metrics::BROADCAST_DROPS_TOTAL.get() - drops_before,
            1
        );
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let hub = hub_with_capacity(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.publish(&snapshot(dec!(2050))), 2);
        assert!(matches!(a.next_event().await, Event::Snapshot(_)));
        assert!(matches!(b.next_event().await, Event::Snapshot(_)));
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters_it() {
        let hub = hub_with_capacity(8);
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(&snapshot(dec!(1))), 0);
    }

    #[tokio::test]
    async fn idle_subscriber_receives_heartbeat() {
        let hub = Arc::new(Hub::new(HubConfig {
            queue_capacity: 8,
            heartbeat: Duration::from_millis(20),
        }));
        let mut sub = hub.subscribe();
        assert!(matches!(sub.next_event().await, Event::Heartbeat));
    }

    #[tokio::test]
    async fn waiting_subscriber_wakes_on_publish() {
        let hub = hub_with_capacity(8);
        let mut sub = hub.subscribe();

        let mut waiter = tokio_test::task::spawn(sub.next_event());
        tokio_test::assert_pending!(waiter.poll());

        hub.publish(&snapshot(dec!(2050)));
        assert!(waiter.is_woken());
        let event = tokio_test::assert_ready!(waiter.poll());
        assert!(matches!(event, Event::Snapshot(_)));
    }
}
