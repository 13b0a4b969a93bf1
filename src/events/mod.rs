//! Event system for real-time state notifications
//!
//! Every lifecycle transition in the crate (capture started/stopped,
//! tracking data, per-frame failures, orchestrator cycles) is published
//! through an [`EventBus`]. The bus is owned per orchestrator instance and
//! injected into the components it coordinates; there are no process-global
//! dispatchers, so multiple orchestrators (and tests) never leak events into
//! each other.

pub mod types;

pub use types::MediaEvent;

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast bus for media events
///
/// Built on tokio's broadcast channel. Events are fire-and-forget: publishing
/// with no subscribers drops the event, and a subscriber that falls too far
/// behind receives a `Lagged` error and misses events.
///
/// # Example
///
/// ```no_run
/// use media_conductor::events::{EventBus, MediaEvent};
/// use media_conductor::capture::CaptureKind;
///
/// let bus = EventBus::new();
///
/// let mut rx = bus.subscribe();
/// bus.publish(MediaEvent::CaptureStarted { kind: CaptureKind::Video });
///
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv().await {
///         println!("Received event: {:?}", event);
///     }
/// });
/// ```
pub struct EventBus {
    tx: broadcast::Sender<MediaEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub fn publish(&self, event: MediaEvent) {
        // If no subscribers, send returns Err which is normal
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.tx.subscribe()
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
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
    use crate::capture::CaptureKind;
    use crate::engine::EngineKind;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(MediaEvent::CaptureStarted {
            kind: CaptureKind::Video,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, MediaEvent::CaptureStarted { .. }));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(MediaEvent::EngineStarted {
            kind: EngineKind::Hands,
        });

        let event1 = rx1.recv().await.unwrap();
        let event2 = rx2.recv().await.unwrap();

        assert!(matches!(event1, MediaEvent::EngineStarted { .. }));
        assert!(matches!(event2, MediaEvent::EngineStarted { .. }));
    }

    #[test]
    fn test_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        // Should not panic when publishing with no subscribers
        bus.publish(MediaEvent::MediaStarting);
    }
}
