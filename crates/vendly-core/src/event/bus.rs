//! Broadcast bus for engine lifecycle events.
//!
//! Lossy by design: publishing never blocks, and a subscriber that falls
//! behind misses events rather than stalling the publisher. Persistence
//! of anything that matters happens before the event is published.

use tokio::sync::broadcast;

use vendly_types::event::EngineEvent;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A zero-subscriber bus swallows it silently.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
