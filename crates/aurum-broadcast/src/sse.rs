//! Server-Sent Events wire frames.
//!
//! Kept as plain string builders so the HTTP layer can stream them without
//! caring about the framing rules (`data:` prefix, blank-line terminator,
//! comment frames for out-of-band signals).

use crate::events::{Event, StreamEvent};

/// First frame on every stream, sent before any data so clients can detect a
/// successful connect immediately.
pub const CONNECTED_FRAME: &str = ": connected\n\n";

/// Comment frame used as a keep-alive. Ignored by EventSource parsers.
pub const HEARTBEAT_FRAME: &str = ": heartbeat\n\n";

/// Render one event as an SSE frame.
pub fn frame(event: &Event) -> String {
    match event {
        Event::Snapshot(stream_event) => data_frame(stream_event),
        Event::Heartbeat => HEARTBEAT_FRAME.to_string(),
    }
}

fn data_frame(event: &StreamEvent) -> String {
    match serde_json::to_string(event) {
        Ok(json) => format!("data: {json}\n\n"),
        // Serialize of a plain struct with string/number fields cannot fail;
        // fall back to a heartbeat rather than poisoning the stream.
        Err(_) => HEARTBEAT_FRAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_is_terminated_by_blank_line() {
        let event = StreamEvent {
            source: "eodhd".into(),
            asset: "gold".into(),
            price: 2050.25,
            bid: None,
            ask: None,
            volume: None,
            sample_count: 3,
            timestamp: "2025-06-01T09:30:00.000+09:00".into(),
        };
        let frame = frame(&Event::Snapshot(event));
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains("\"price\":2050.25"));
    }

    #[test]
    fn heartbeat_is_a_comment_frame() {
        assert_eq!(frame(&Event::Heartbeat), ": heartbeat\n\n");
    }
}
