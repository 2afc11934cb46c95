//! Fan-out of aggregated snapshots to streaming subscribers.
//!
//! Every subscriber owns a bounded queue. A slow consumer only loses its own
//! oldest events; it never blocks the publisher or other subscribers.

mod events;
mod hub;
pub mod sse;

pub use events::{Event, StreamEvent};
pub use hub::{Hub, HubConfig, Subscription};
