//! A bounded, best-effort in-memory event bus.
//!
//! Publishes the 9 topics from spec.md §6 (`execution.queued`,
//! `execution.started`, `execution.node.started`, `execution.node.completed`,
//! `execution.completed`, `execution.failed`, `execution.cancelled`,
//! `queue.metrics`, `cost.calculated`). A slow or absent subscriber never
//! blocks the publisher — `tokio::sync::broadcast` drops the oldest message
//! once a receiver falls behind rather than applying back-pressure to the
//! orchestrator, so a publish never holds a state-store transaction open.

use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish a topic. Silently drops the message if there are no
    /// subscribers or the channel is full — this bus is a diagnostics and
    /// integration feed, not a durable delivery guarantee.
    pub fn publish(&self, topic: impl Into<String>, payload: Value) {
        let _ = self.sender.send(Event { topic: topic.into(), payload });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish("execution.completed", serde_json::json!({"ok": true}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, "execution.completed");
    }
}
