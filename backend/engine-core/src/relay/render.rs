//! Render-in-flight tracking.
//!
//! The relay opens a [`RenderGuard`] around every heavy command; the health
//! monitor reads [`RenderWatch::is_rendering`] to pick its miss threshold.
//! Guards from before a [`RenderTracker::reset`] belong to an older epoch and
//! no longer count when they drop.

use std::sync::Arc;

use log::trace;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RenderActivity {
    epoch: u64,
    in_flight: usize,
}

#[derive(Debug, Clone)]
pub struct RenderTracker {
    tx: Arc<watch::Sender<RenderActivity>>,
}

impl RenderTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(RenderActivity::default());
        Self { tx: Arc::new(tx) }
    }

    /// Mark one heavy command as in flight until the guard drops.
    pub fn begin(&self, command: &str) -> RenderGuard {
        let mut epoch = 0;
        self.tx.send_modify(|activity| {
            activity.in_flight += 1;
            epoch = activity.epoch;
        });
        trace!("Render started: {command}");

        RenderGuard {
            tx: Arc::clone(&self.tx),
            epoch,
            command: command.to_string(),
        }
    }

    /// Forget every outstanding guard.
    pub fn reset(&self) {
        self.tx.send_modify(|activity| {
            activity.epoch += 1;
            activity.in_flight = 0;
        });
    }

    pub fn in_flight(&self) -> usize {
        self.tx.borrow().in_flight
    }

    pub fn watch(&self) -> RenderWatch {
        RenderWatch {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for RenderTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "the render is considered finished as soon as the guard drops"]
pub struct RenderGuard {
    tx: Arc<watch::Sender<RenderActivity>>,
    epoch: u64,
    command: String,
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        let epoch = self.epoch;
        self.tx.send_if_modified(|activity| {
            if activity.epoch != epoch {
                return false;
            }
            activity.in_flight = activity.in_flight.saturating_sub(1);
            true
        });
        trace!("Render finished: {}", self.command);
    }
}

/// Read-only view of the tracker.
#[derive(Debug, Clone)]
pub struct RenderWatch {
    rx: watch::Receiver<RenderActivity>,
}

impl RenderWatch {
    pub fn is_rendering(&self) -> bool {
        self.rx.borrow().in_flight > 0
    }
}
