//! Event system for catalog writes
//!
//! Services emit a [`StorageEvent`] after every successful write. The binary
//! subscribes a [`LoggingEventListener`] as an audit trail.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::db::{ContentKind, MainType};

/// Storage events emitted by services
#[derive(Debug, Clone, PartialEq)]
pub enum StorageEvent {
    // Category events
    CategoryCreated {
        id: i64,
        kind: ContentKind,
        name: String,
    },
    CategoryRenamed {
        id: i64,
        name: String,
    },
    CategoryDeleted {
        id: i64,
    },

    // Content events
    ContentCreated {
        id: i64,
        kind: ContentKind,
        slug: String,
    },
    ContentUpdated {
        id: i64,
        slug: String,
    },
    ContentDeleted {
        id: i64,
    },

    // Breaking news events
    BreakingNewsCreated {
        id: i64,
        content_item_id: i64,
    },
    BreakingNewsToggled {
        id: i64,
        active: bool,
    },
    BreakingNewsDeleted {
        id: i64,
    },

    // Guide events
    GuideNodeCreated {
        id: i64,
        main_type: MainType,
        label: String,
    },
    GuideNodeUpdated {
        id: i64,
    },
    GuideNodeDeleted {
        id: i64,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &StorageEvent);
}

/// Event bus for broadcasting storage events
pub struct EventBus {
    sender: broadcast::Sender<StorageEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: StorageEvent) {
        trace!(event = ?event, "Emitting storage event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &StorageEvent) {
        match event {
            StorageEvent::CategoryCreated { id, kind, name } => {
                info!(id, kind = %kind, name = %name, "Category created");
            }
            StorageEvent::CategoryDeleted { id } => {
                info!(id, "Category deleted");
            }
            StorageEvent::ContentCreated { id, kind, slug } => {
                info!(id, kind = %kind, slug = %slug, "Content created");
            }
            StorageEvent::ContentDeleted { id } => {
                info!(id, "Content deleted");
            }
            StorageEvent::GuideNodeCreated { id, main_type, label } => {
                info!(id, main_type = %main_type, label = %label, "Guide node created");
            }
            StorageEvent::GuideNodeDeleted { id } => {
                info!(id, "Guide node deleted");
            }
            _ => {
                debug!(event = ?event, "Storage event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(StorageEvent::ContentCreated {
            id: 7,
            kind: ContentKind::Product,
            slug: "kgb".into(),
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        assert_eq!(
            event,
            StorageEvent::ContentCreated {
                id: 7,
                kind: ContentKind::Product,
                slug: "kgb".into(),
            }
        );
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(StorageEvent::CategoryDeleted { id: 1 });
    }

    #[tokio::test]
    async fn test_logging_listener_stops_when_bus_dropped() {
        let bus = Arc::new(EventBus::new());
        let handle = spawn_logging_listener(bus.clone());
        bus.emit(StorageEvent::GuideNodeDeleted { id: 3 });
        drop(bus);
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener did not stop")
            .expect("listener panicked");
    }
}
