use crate::core::ProspectId;
use tokio::sync::broadcast;

/// Outcome notifications for UI subscribers.
///
/// Timer-driven flushes have no caller to return an error to, so failures are
/// reported here.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    FlushSucceeded {
        id: ProspectId,
        fields: Vec<String>,
    },
    FlushFailed {
        id: ProspectId,
        message: String,
        /// View fields restored to their pre-edit values.
        rolled_back: Vec<String>,
    },
    ShapeSaved {
        id: ProspectId,
        acres: Option<f64>,
    },
    Created {
        id: ProspectId,
    },
    Deleted {
        id: ProspectId,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Having no subscribers is not an error.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }
}
