//! In-process event bus.
//!
//! Every publish takes a snapshot of the current subscribers and delivers to
//! that snapshot in order, on the publishing task. Subscribing and
//! unsubscribing only touch the list, never an in-flight delivery.
//!
//! A subscriber that panics is isolated: the panic is caught, logged, and
//! delivery continues with the next subscriber.

use crate::error::ErrorReason;
use crate::sample::Sample;
use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Notifications emitted by the tracking engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingEvent {
    /// Tracking switched on or off
    StatusChanged { is_tracking: bool },

    /// A sample was accepted and persisted
    SampleAccepted(Sample),

    /// A failure that callers and observers should know about
    ErrorOccurred { reason: ErrorReason, message: String },

    /// A single poll failed; tracking continues
    ReadingFailed { consecutive: u32, message: String },
}

impl TrackingEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackingEvent::StatusChanged { .. } => "status_changed",
            TrackingEvent::SampleAccepted(_) => "sample_accepted",
            TrackingEvent::ErrorOccurred { .. } => "error_occurred",
            TrackingEvent::ReadingFailed { .. } => "reading_failed",
        }
    }
}

/// Receives engine events.
///
/// Called synchronously on the publishing task; keep it short. Closures
/// `Fn(&TrackingEvent)` implement this trait.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &TrackingEvent);
}

impl<F> EventSubscriber for F
where
    F: Fn(&TrackingEvent) + Send + Sync,
{
    fn on_event(&self, event: &TrackingEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded tokio channel.
struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<TrackingEvent>,
}

impl EventSubscriber for ChannelSubscriber {
    fn on_event(&self, event: &TrackingEvent) {
        // Receiver dropped: nothing left to deliver to
        let _ = self.tx.send(event.clone());
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe hub shared by the engine and its observers.
pub struct EventBus {
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn EventSubscriber>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a subscriber for all future events.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        id
    }

    /// Registers a closure.
    pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&TrackingEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(f))
    }

    /// Registers a channel and returns its receiving end.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<TrackingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(Arc::new(ChannelSubscriber { tx }));
        (id, rx)
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Delivers `event` to every subscriber registered at call time.
    pub fn publish(&self, event: TrackingEvent) {
        let snapshot: Vec<(SubscriptionId, Arc<dyn EventSubscriber>)> =
            self.subscribers.read().clone();

        for (id, subscriber) in snapshot {
            let delivered = catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event)));
            if delivered.is_err() {
                warn!(
                    subscription = id.0,
                    event = event.kind(),
                    "event subscriber panicked; continuing delivery"
                );
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn status(is_tracking: bool) -> TrackingEvent {
        TrackingEvent::StatusChanged { is_tracking }
    }

    #[test]
    fn test_events_delivered_in_publish_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_fn(move |e| sink.lock().push(e.clone()));

        bus.publish(status(true));
        bus.publish(status(false));

        assert_eq!(*seen.lock(), vec![status(true), status(false)]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (id, mut rx) = bus.subscribe_channel();

        bus.publish(status(true));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(status(false));

        assert_eq!(rx.try_recv().unwrap(), status(true));
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        bus.subscribe_fn(|_| panic!("subscriber bug"));
        let (_, mut rx) = bus.subscribe_channel();

        bus.publish(status(true));

        assert_eq!(rx.try_recv().unwrap(), status(true));
    }

    #[test]
    fn test_unsubscribe_during_delivery_uses_snapshot() {
        let bus = Arc::new(EventBus::new());
        let target: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let handle = Arc::clone(&bus);
        let slot = Arc::clone(&target);
        bus.subscribe_fn(move |_| {
            if let Some(id) = slot.lock().take() {
                handle.unsubscribe(id);
            }
        });
        let (late_id, mut rx) = bus.subscribe_channel();
        *target.lock() = Some(late_id);

        // Removed mid-delivery, but still part of this publish's snapshot
        bus.publish(status(true));
        bus.publish(status(false));

        assert_eq!(rx.try_recv().unwrap(), status(true));
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_event_json_shape() {
        let value = serde_json::to_value(status(true)).unwrap();
        assert_eq!(value["kind"], "status_changed");
        assert_eq!(value["is_tracking"], true);
    }
}
