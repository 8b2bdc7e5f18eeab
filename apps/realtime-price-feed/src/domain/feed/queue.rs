//! Outbound Messages
//!
//! Commands sent to the feed server and the FIFO that holds them while the
//! transport is not ready.

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::{Value, json};

/// Type tag of the subscribe command sent on every successful open.
pub const SUBSCRIBE_PORTFOLIO_WATCHLIST: &str = "subscribe_portfolio_watchlist";

/// Type tag of the best-effort command sent before a deliberate teardown.
pub const UNSUBSCRIBE_ALL: &str = "unsubscribe_all";

/// Structured command destined for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OutboundMessage(Value);

impl OutboundMessage {
    /// Wrap an arbitrary JSON value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// `{"type":"subscribe_portfolio_watchlist"}`
    #[must_use]
    pub fn subscribe_portfolio_watchlist() -> Self {
        Self(json!({ "type": SUBSCRIBE_PORTFOLIO_WATCHLIST }))
    }

    /// `{"type":"unsubscribe_all"}`
    #[must_use]
    pub fn unsubscribe_all() -> Self {
        Self(json!({ "type": UNSUBSCRIBE_ALL }))
    }

    /// The `type` field, if present.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// Underlying JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Serialize to the wire format.
    #[must_use]
    pub fn to_json(&self) -> String {
        self.0.to_string()
    }
}

impl From<Value> for OutboundMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// FIFO of messages waiting for the transport.
///
/// Bounded by `capacity` (0 = unbounded). When full, the oldest entry is
/// evicted to make room.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    messages: VecDeque<OutboundMessage>,
    capacity: usize,
}

impl OutboundQueue {
    /// Create a queue with the given capacity (0 = unbounded).
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity,
        }
    }

    /// Append a message. Returns the evicted message on overflow.
    pub fn push(&mut self, message: OutboundMessage) -> Option<OutboundMessage> {
        let evicted = if self.capacity > 0 && self.messages.len() >= self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// Take every queued message in enqueue order, leaving the queue empty.
    pub fn drain_all(&mut self) -> Vec<OutboundMessage> {
        self.messages.drain(..).collect()
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: u32) -> OutboundMessage {
        OutboundMessage::new(json!({ "type": "watch", "n": n }))
    }

    #[test]
    fn protocol_messages() {
        assert_eq!(
            OutboundMessage::subscribe_portfolio_watchlist().to_json(),
            r#"{"type":"subscribe_portfolio_watchlist"}"#
        );
        assert_eq!(
            OutboundMessage::unsubscribe_all().message_type(),
            Some(UNSUBSCRIBE_ALL)
        );
    }

    #[test]
    fn drain_preserves_order_and_empties() {
        let mut queue = OutboundQueue::new(0);
        queue.push(msg(1));
        queue.push(msg(2));
        queue.push(msg(3));

        assert_eq!(queue.drain_all(), vec![msg(1), msg(2), msg(3)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let mut queue = OutboundQueue::new(2);
        assert!(queue.push(msg(1)).is_none());
        assert!(queue.push(msg(2)).is_none());
        assert_eq!(queue.push(msg(3)), Some(msg(1)));
        assert_eq!(queue.drain_all(), vec![msg(2), msg(3)]);
    }

    #[test]
    fn zero_capacity_is_unbounded() {
        let mut queue = OutboundQueue::new(0);
        for n in 0..5_000 {
            assert!(queue.push(msg(n)).is_none());
        }
        assert_eq!(queue.len(), 5_000);
    }
}
