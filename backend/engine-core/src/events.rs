//! Host-facing notifications.

use crate::health::HealthStatus;
use crate::relay::ExportProgress;

use log::trace;
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HostEvent {
    Health(HealthStatus),
    ExportProgress(ExportProgress),
}

/// Fan-out of [`HostEvent`]s to any number of observers.
///
/// Publishing never blocks and never fails; an observer that falls behind
/// sees `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HostEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: HostEvent) {
        if self.tx.send(event).is_err() {
            trace!("No event observers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
