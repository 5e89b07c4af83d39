//! Event Bus - pub/sub bridge for host lifecycle events
//!
//! The host glue emits lifecycle events onto the bus; the retry state machine
//! (and anything else interested, such as a logger) subscribes.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::LifecycleEvent;

/// Default channel capacity (events)
///
/// Lifecycle events arrive a handful per generation, so this is generous.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast bus for host lifecycle events
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: LifecycleEvent) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    // === Convenience methods ===

    /// Emit a generation started event
    pub fn generation_started(&self, trigger: Option<&str>) {
        self.emit(LifecycleEvent::GenerationStarted {
            trigger: trigger.map(str::to_string),
        });
    }

    /// Emit a generation ended event
    pub fn generation_ended(&self) {
        self.emit(LifecycleEvent::GenerationEnded);
    }

    /// Emit a generation stopped (user abort) event
    pub fn generation_stopped(&self) {
        self.emit(LifecycleEvent::GenerationStopped);
    }

    /// Emit a chat changed event
    pub fn chat_changed(&self) {
        self.emit(LifecycleEvent::ChatChanged);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}
