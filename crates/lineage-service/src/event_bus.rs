pub use lineage_core::{EntityEvent, EntityEventKind};
use tokio::sync::broadcast;
use tracing::debug;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of the broadcast channel
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Best-effort broadcast of mutation events
///
/// Publishing never fails the surrounding operation: a send with no
/// subscribers, or with lagging subscribers, is logged and dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EntityEvent>,
}

impl EventBus {
    /// Create an EventBus with the given config
    pub fn new(config: EventBusConfig) -> Self {
        let (tx, _) = broadcast::channel(config.capacity);
        Self { tx }
    }

    /// Subscribe to mutation events
    pub fn subscribe(&self) -> broadcast::Receiver<EntityEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, best-effort
    pub fn publish(&self, event: EntityEvent) {
        if let Err(err) = self.tx.send(event) {
            debug!("Dropped event with no subscribers: {}", err);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::EntityKey;

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(EntityEvent::committed(
            EntityKey::new("playlist", "mix"),
            "snap-1".to_string(),
            serde_json::json!({}),
        ));
    }

    #[tokio::test]
    async fn test_subscribers_each_get_a_copy() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(EntityEvent::committed(
            EntityKey::new("playlist", "mix"),
            "snap-1".to_string(),
            serde_json::json!({}),
        ));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.snapshot_id.as_deref(), Some("snap-1"));
        assert_eq!(e2.snapshot_id.as_deref(), Some("snap-1"));
    }
}
