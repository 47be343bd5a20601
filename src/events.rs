//! In-process event bus.
//!
//! Every component publishes through the bus and every consumer subscribes
//! through it; it is the sole inter-component notification path. Publish
//! order is the single consistent order all subscribers observe.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use trellis_types::SyncEvent;

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<SyncEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to all subsequent events. There is no replay buffer:
    /// a new subscriber only sees events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SyncEvent) {
        debug!("bus publish: {}", label(&event));
        // Ignore errors when there are no active subscribers
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn label(event: &SyncEvent) -> &'static str {
    match event {
        SyncEvent::Connected => "connected",
        SyncEvent::Disconnected => "disconnected",
        SyncEvent::Realtime(_) => "realtime_event",
        SyncEvent::OptimisticApplied(_) => "optimistic_update",
        SyncEvent::OptimisticConfirmed { .. } => "optimistic_confirmed",
        SyncEvent::OptimisticFailed { .. } => "optimistic_failed",
        SyncEvent::RevertOptimistic { .. } => "revert_optimistic",
        SyncEvent::Conflict(_) => "sync_conflict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_publish_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(SyncEvent::Connected);
        bus.publish(SyncEvent::Disconnected);

        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::Connected));
        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::Disconnected));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new(16);
        bus.publish(SyncEvent::Connected);
        assert_eq!(bus.subscriber_count(), 0);

        // A later subscriber does not see the earlier event.
        let mut rx = bus.subscribe();
        bus.publish(SyncEvent::Disconnected);
        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::Disconnected));
    }
}
