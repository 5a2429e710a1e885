//! Event recorder used by the runner and the tests.

use geotrail_core::{ErrorReason, EventSubscriber, Sample, TrackingEvent};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Notify;

/// Per-kind event counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub status_changed: usize,
    pub sample_accepted: usize,
    pub error_occurred: usize,
    pub reading_failed: usize,
}

/// Records every event and signals when tracking switches off.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<TrackingEvent>>,
    stopped: Notify,
}

impl EventRecorder {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TrackingEvent> {
        self.events.lock().clone()
    }

    /// Samples carried by `SampleAccepted`, in delivery order.
    pub fn accepted(&self) -> Vec<Sample> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TrackingEvent::SampleAccepted(sample) => Some(sample.clone()),
                _ => None,
            })
            .collect()
    }

    /// Reasons of every `ErrorOccurred`, in delivery order.
    pub fn errors(&self) -> Vec<ErrorReason> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TrackingEvent::ErrorOccurred { reason, .. } => Some(*reason),
                _ => None,
            })
            .collect()
    }

    pub fn counts(&self) -> EventCounts {
        let mut counts = EventCounts::default();
        for event in self.events.lock().iter() {
            match event {
                TrackingEvent::StatusChanged { .. } => counts.status_changed += 1,
                TrackingEvent::SampleAccepted(_) => counts.sample_accepted += 1,
                TrackingEvent::ErrorOccurred { .. } => counts.error_occurred += 1,
                TrackingEvent::ReadingFailed { .. } => counts.reading_failed += 1,
            }
        }
        counts
    }

    /// Resolves once a `StatusChanged { is_tracking: false }` was recorded.
    pub async fn wait_stopped(&self) {
        self.stopped.notified().await;
    }
}

impl EventSubscriber for EventRecorder {
    fn on_event(&self, event: &TrackingEvent) {
        self.events.lock().push(event.clone());
        if matches!(event, TrackingEvent::StatusChanged { is_tracking: false }) {
            self.stopped.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_kind() {
        let recorder = EventRecorder::default();
        recorder.on_event(&TrackingEvent::StatusChanged { is_tracking: true });
        recorder.on_event(&TrackingEvent::ReadingFailed {
            consecutive: 1,
            message: "timeout".into(),
        });
        recorder.on_event(&TrackingEvent::ErrorOccurred {
            reason: ErrorReason::ProviderUnavailable,
            message: "down".into(),
        });

        let counts = recorder.counts();
        assert_eq!(counts.status_changed, 1);
        assert_eq!(counts.reading_failed, 1);
        assert_eq!(recorder.errors(), vec![ErrorReason::ProviderUnavailable]);
        assert!(recorder.accepted().is_empty());
    }
}
