use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::events::TelemetryEvent;

/// One registered dashboard connection. The channel is bounded; a
/// subscriber that cannot drain it in time is evicted rather than allowed
/// to stall the pipeline.
#[derive(Debug)]
struct Subscriber {
    sender: mpsc::Sender<TelemetryEvent>,
    connected_at: DateTime<Utc>,
}

/// Fan-out registry for live telemetry. Cloning shares the registry.
#[derive(Clone)]
pub struct Hub {
    subscribers: Arc<RwLock<HashMap<Uuid, Subscriber>>>,
    buffer: usize,
}

impl Hub {
    /// `buffer` is the per-subscriber queue depth. It must be at least the
    /// history ring capacity so a full replay always fits.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            buffer,
        }
    }

    /// Registers a new subscriber. The replay closure runs while the
    /// registry is locked, so no concurrent publish can land between the
    /// snapshot it takes and the registration: the subscriber sees the
    /// replay first, then every later event, exactly once.
    pub fn subscribe_with<F>(&self, replay: F) -> (Uuid, mpsc::Receiver<TelemetryEvent>)
    where
        F: FnOnce() -> Vec<TelemetryEvent>,
    {
        let mut subscribers = self.subscribers.write();
        let (sender, receiver) = mpsc::channel(self.buffer);
        for event in replay() {
            // The channel is fresh and sized for a full replay, so this
            // cannot reject.
            let _ = sender.try_send(event);
        }
        let id = Uuid::new_v4();
        subscribers.insert(
            id,
            Subscriber {
                sender,
                connected_at: Utc::now(),
            },
        );
        debug!(subscriber = %id, total = subscribers.len(), "subscriber attached");
        (id, receiver)
    }

    /// Delivers one event to every subscriber without blocking. Dead or
    /// hopelessly backlogged subscribers are removed; the rest are
    /// unaffected.
    pub fn publish(&self, event: &TelemetryEvent) {
        let mut subscribers = self.subscribers.write();
        fan_out(&mut subscribers, event);
    }

    /// Produces an event and delivers it while the registry is locked.
    /// Ingest uses this so that recording a sample and handing it to
    /// subscribers is one step: a subscriber attaching concurrently either
    /// replays the sample or receives it live, never both and never
    /// neither.
    pub fn publish_with<F>(&self, produce: F)
    where
        F: FnOnce() -> TelemetryEvent,
    {
        let mut subscribers = self.subscribers.write();
        let event = produce();
        fan_out(&mut subscribers, &event);
    }

    /// Deregisters a subscriber that closed its connection normally.
    pub fn remove(&self, id: Uuid) {
        if self.subscribers.write().remove(&id).is_some() {
            debug!(subscriber = %id, "subscriber detached");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

fn fan_out(subscribers: &mut HashMap<Uuid, Subscriber>, event: &TelemetryEvent) {
    let mut dropped = Vec::new();
    for (id, subscriber) in subscribers.iter() {
        if subscriber.sender.try_send(event.clone()).is_err() {
            dropped.push(*id);
        }
    }
    for id in dropped {
        if let Some(subscriber) = subscribers.remove(&id) {
            debug!(
                subscriber = %id,
                connected_at = %subscriber.connected_at,
                "evicting unreachable subscriber"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_arrives_before_live_events() {
        let hub = Hub::new(16);
        let (_id, mut rx) = hub.subscribe_with(|| {
            vec![
                TelemetryEvent::status_text("replayed 1"),
                TelemetryEvent::status_text("replayed 2"),
            ]
        });
        hub.publish(&TelemetryEvent::status_text("live"));

        assert_eq!(rx.recv().await, Some(TelemetryEvent::status_text("replayed 1")));
        assert_eq!(rx.recv().await, Some(TelemetryEvent::status_text("replayed 2")));
        assert_eq!(rx.recv().await, Some(TelemetryEvent::status_text("live")));
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let hub = Hub::new(16);
        let (_a, mut rx_a) = hub.subscribe_with(Vec::new);
        let (_b, mut rx_b) = hub.subscribe_with(Vec::new);
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish(&TelemetryEvent::status_text("hello"));
        assert_eq!(rx_a.recv().await, Some(TelemetryEvent::status_text("hello")));
        assert_eq!(rx_b.recv().await, Some(TelemetryEvent::status_text("hello")));
    }

    #[tokio::test]
    async fn closed_subscriber_is_evicted_on_publish() {
        let hub = Hub::new(16);
        let (_id, rx) = hub.subscribe_with(Vec::new);
        drop(rx);
        assert_eq!(hub.subscriber_count(), 1);

        hub.publish(&TelemetryEvent::status_text("anyone there"));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn backlogged_subscriber_is_evicted_not_waited_on() {
        let hub = Hub::new(1);
        let (_slow, _rx_slow) = hub.subscribe_with(Vec::new);
        let (_fast, mut rx_fast) = hub.subscribe_with(Vec::new);

        // First event fills the slow queue; the second overflows it.
        hub.publish(&TelemetryEvent::status_text("one"));
        rx_fast.recv().await.unwrap();
        hub.publish(&TelemetryEvent::status_text("two"));

        assert_eq!(rx_fast.recv().await, Some(TelemetryEvent::status_text("two")));
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn publish_with_delivers_the_produced_event() {
        let hub = Hub::new(16);
        let (_id, mut rx) = hub.subscribe_with(Vec::new);
        hub.publish_with(|| TelemetryEvent::status_text("made under lock"));
        assert_eq!(
            rx.recv().await,
            Some(TelemetryEvent::status_text("made under lock"))
        );
    }

    #[tokio::test]
    async fn remove_deregisters_silently() {
        let hub = Hub::new(4);
        let (id, _rx) = hub.subscribe_with(Vec::new);
        hub.remove(id);
        assert_eq!(hub.subscriber_count(), 0);
        // Removing twice is a no-op.
        hub.remove(id);
    }
}
