//! Fan-out of run-lifecycle events to live subscribers
//!
//! The broker is constructed once by the hosting application and handed to
//! whatever needs to publish or subscribe; it is not a global. Delivery is
//! best-effort: a subscriber whose inbox is full misses that message.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-subscriber inbox capacity
const INBOX_CAPACITY: usize = 10;

/// A live subscription handle
pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<String>,
}

/// Broadcast fan-out point for lifecycle events
#[derive(Default)]
pub struct EventBroker {
    subscribers: RwLock<HashMap<Uuid, mpsc::Sender<String>>>,
}

impl EventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with a bounded inbox
    ///
    /// The inbox starts with a `connected` acknowledgement frame.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(INBOX_CAPACITY);
        let id = Uuid::new_v4();

        let _ = sender.try_send(format_frame(
            "connected",
            &serde_json::json!({ "message": "connected to event stream" }),
        ));

        let mut subscribers = self.subscribers.write().unwrap();
        subscribers.insert(id, sender);
        debug!("event subscriber registered (total: {})", subscribers.len());

        Subscription { id, receiver }
    }

    /// Remove a subscriber; unknown handles are a no-op
    pub fn unsubscribe(&self, id: Uuid) {
        let mut subscribers = self.subscribers.write().unwrap();
        if subscribers.remove(&id).is_some() {
            debug!("event subscriber removed (total: {})", subscribers.len());
        }
    }

    /// Deliver a formatted event frame to every current subscriber
    ///
    /// Never blocks: subscribers with a full or closed inbox are skipped
    /// for this message.
    pub fn broadcast<T: Serialize>(&self, event_type: &str, payload: &T) {
        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!("failed to serialize {} event payload: {}", event_type, e);
                return;
            }
        };
        let message = format_frame(event_type, &data);

        let subscribers = self.subscribers.read().unwrap();
        for sender in subscribers.values() {
            let _ = sender.try_send(message.clone());
        }
        debug!(
            "broadcast {} event to {} subscriber(s)",
            event_type,
            subscribers.len()
        );
    }
}

fn format_frame(event_type: &str, data: &serde_json::Value) -> String {
    format!("event: {}\ndata: {}\n\n", event_type, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_receives_ack_then_broadcasts() {
        let broker = EventBroker::new();
        let mut sub = broker.subscribe();

        let ack = sub.receiver.recv().await.unwrap();
        assert!(ack.starts_with("event: connected\n"));

        broker.broadcast("run_started", &serde_json::json!({ "project": "web" }));
        let frame = sub.receiver.recv().await.unwrap();
        assert_eq!(
            frame,
            "event: run_started\ndata: {\"project\":\"web\"}\n\n"
        );
    }

    #[tokio::test]
    async fn test_full_inbox_skips_message_for_that_subscriber() {
        let broker = EventBroker::new();
        let mut slow = broker.subscribe();

        // Overflow the slow inbox (one slot is already taken by the ack)
        for i in 0..(INBOX_CAPACITY + 5) {
            broker.broadcast("tick", &serde_json::json!({ "n": i }));
        }

        // A subscriber with room still gets the next message
        let mut fast = broker.subscribe();
        broker.broadcast("late", &serde_json::json!({}));

        let ack = fast.receiver.try_recv().unwrap();
        assert!(ack.starts_with("event: connected\n"));
        let late = fast.receiver.try_recv().unwrap();
        assert!(late.starts_with("event: late\n"));

        // The slow inbox capped out; overflow was dropped, not queued
        let mut slow_count = 0;
        while slow.receiver.try_recv().is_ok() {
            slow_count += 1;
        }
        assert_eq!(slow_count, INBOX_CAPACITY);

        // Delivery resumes once there is room again
        broker.broadcast("tick", &serde_json::json!({ "n": "after" }));
        assert!(slow.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let broker = EventBroker::new();
        let sub = broker.subscribe();
        broker.unsubscribe(sub.id);
        broker.unsubscribe(sub.id);

        broker.broadcast("tick", &serde_json::json!({}));
        let mut receiver = sub.receiver;
        // Ack frame is still there, then the channel is closed
        assert!(receiver.recv().await.is_some());
        assert!(receiver.recv().await.is_none());
    }
}
