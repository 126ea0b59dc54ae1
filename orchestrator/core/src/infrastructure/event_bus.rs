// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Transfer Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Observers (CLI, status API, tests) subscribe to jump and delivery events.
//
// In-memory only: events published before a subscriber exists are not replayed.

use crate::domain::events::TransferEvent;
use crate::domain::jump::JumpId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to transfer events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<TransferEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a transfer event to all subscribers
    pub fn publish(&self, event: TransferEvent) {
        debug!(event = event.name(), "Publishing event");

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all transfer events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for one jump attempt
    pub fn subscribe_jump(&self, jump_id: JumpId) -> JumpEventReceiver {
        JumpEventReceiver {
            receiver: self.sender.subscribe(),
            jump_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all transfer events
pub struct EventReceiver {
    receiver: broadcast::Receiver<TransferEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<TransferEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<TransferEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for the events of a single jump attempt
pub struct JumpEventReceiver {
    receiver: broadcast::Receiver<TransferEvent>,
    jump_id: JumpId,
}

impl JumpEventReceiver {
    /// Receive the next event for the jump, skipping everything else
    pub async fn recv(&mut self) -> Result<TransferEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.jump_id() == Some(self.jump_id) {
                return Ok(event);
            }
        }
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::structure::StructureId;
    use chrono::Utc;

    fn started(jump_id: JumpId) -> TransferEvent {
        TransferEvent::JumpStarted {
            jump_id,
            portal: "Alpha".to_string(),
            structure_id: StructureId(1),
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let jump_id = JumpId::new();

        event_bus.publish(started(jump_id));

        match receiver.recv().await.unwrap() {
            TransferEvent::JumpStarted { jump_id: id, .. } => assert_eq!(id, jump_id),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_jump_event_filtering() {
        let event_bus = EventBus::new(10);
        let jump_id = JumpId::new();
        let mut receiver = event_bus.subscribe_jump(jump_id);

        event_bus.publish(started(JumpId::new()));
        event_bus.publish(TransferEvent::DeliveryQueued {
            file_name: "Beta_1_a_b_2.wgt".to_string(),
            account_id: crate::domain::identity::AccountId(1),
            queued_at: Utc::now(),
        });
        event_bus.publish(started(jump_id));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.jump_id(), Some(jump_id));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(started(JumpId::new()));

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
        assert!(matches!(receiver1.try_recv(), Err(EventBusError::Empty)));
    }
}
