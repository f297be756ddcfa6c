//! Asynchronous reader event types and delivery.
//!
//! Events are published by the IO task and the session state machine onto an
//! unbounded queue. A single dispatch task drains that queue into a
//! [`tokio::sync::broadcast`] channel, so publishing never waits on
//! subscribers and order within the queue is preserved.

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::tag::Tag;
use crate::types::ConnectionState;

/// An event emitted by a reader session.
#[derive(Debug, Clone)]
pub enum ReaderEvent {
    /// The session moved to a new connection state.
    StatusChanged {
        state: ConnectionState,
        timestamp: DateTime<Utc>,
    },

    /// A digital input changed level.
    InputChanged {
        /// 1-based input pin.
        pin: u8,
        /// `true` for HIGH.
        high: bool,
        timestamp: DateTime<Utc>,
    },

    /// Tags were seen in an inventory report.
    ///
    /// Carries the newly or again-seen tags from one report, not the whole
    /// session store.
    InventoryUpdated {
        tags: Vec<Tag>,
        timestamp: DateTime<Utc>,
    },
}

impl ReaderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ReaderEvent::StatusChanged { .. } => EventKind::Status,
            ReaderEvent::InputChanged { .. } => EventKind::Input,
            ReaderEvent::InventoryUpdated { .. } => EventKind::Inventory,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ReaderEvent::StatusChanged { timestamp, .. }
            | ReaderEvent::InputChanged { timestamp, .. }
            | ReaderEvent::InventoryUpdated { timestamp, .. } => *timestamp,
        }
    }
}

/// The three notification kinds a subscriber can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    Input,
    Inventory,
}

/// Default broadcast capacity per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Publishing side of the event surface.
///
/// Cloning is cheap; all clones feed the same dispatch task. The dispatch
/// task exits once every clone has been dropped.
#[derive(Clone)]
pub struct EventBus {
    queue: mpsc::UnboundedSender<ReaderEvent>,
    broadcast: broadcast::Sender<ReaderEvent>,
}

impl EventBus {
    /// Create a bus and spawn its dispatch task on the current runtime.
    pub fn new(capacity: usize) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<ReaderEvent>();
        let (broadcast, _) = broadcast::channel(capacity.max(1));
        let tx = broadcast.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                // No subscribers is not an error.
                let _ = tx.send(event);
            }
            debug!("event dispatch task exiting");
        });
        EventBus { queue, broadcast }
    }

    /// Queue an event for delivery. Never blocks.
    pub fn publish(&self, event: ReaderEvent) {
        if self.queue.send(event).is_err() {
            debug!("event dispatch task gone, dropping event");
        }
    }

    /// Receive every event.
    pub fn subscribe(&self) -> broadcast::Receiver<ReaderEvent> {
        self.broadcast.subscribe()
    }

    /// Receive only the given kinds of event.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventSubscription {
        EventSubscription {
            rx: self.broadcast.subscribe(),
            kinds: kinds.to_vec(),
        }
    }
}

/// A filtered event stream.
pub struct EventSubscription {
    rx: broadcast::Receiver<ReaderEvent>,
    kinds: Vec<EventKind>,
}

impl EventSubscription {
    /// Wait for the next matching event. Returns `None` once the bus is gone.
    ///
    /// A subscriber that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<ReaderEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status(state: ConnectionState) -> ReaderEvent {
        ReaderEvent::StatusChanged {
            state,
            timestamp: Utc::now(),
        }
    }

    fn input(pin: u8) -> ReaderEvent {
        ReaderEvent::InputChanged {
            pin,
            high: true,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn published_events_reach_subscribers_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(status(ConnectionState::Connecting));
        bus.publish(status(ConnectionState::Ready));

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            first,
            ReaderEvent::StatusChanged { state: ConnectionState::Connecting, .. }
        ));
        assert!(matches!(
            second,
            ReaderEvent::StatusChanged { state: ConnectionState::Ready, .. }
        ));
    }

    #[tokio::test]
    async fn filtered_subscription_skips_other_kinds() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe_to(&[EventKind::Input]);
        bus.publish(status(ConnectionState::Ready));
        bus.publish(input(2));

        let event = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ReaderEvent::InputChanged { pin: 2, .. }));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        for _ in 0..10 {
            bus.publish(input(1));
        }
    }

    #[tokio::test]
    async fn lagged_subscription_keeps_going() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe_to(&[EventKind::Input]);
        for pin in 1..=6 {
            bus.publish(input(pin));
        }
        let event = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ReaderEvent::InputChanged { .. }));
    }

    #[test]
    fn event_kind_mapping() {
        assert_eq!(status(ConnectionState::Ready).kind(), EventKind::Status);
        assert_eq!(input(1).kind(), EventKind::Input);
        let inv = ReaderEvent::InventoryUpdated {
            tags: Vec::new(),
            timestamp: Utc::now(),
        };
        assert_eq!(inv.kind(), EventKind::Inventory);
    }
}
