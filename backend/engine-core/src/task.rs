//! Cancellable fixed-interval task.
//!
//! Used for the liveness ping loop and the export poll loop. Ticks never
//! overlap: the next interval starts only after the previous tick resolved.
//! Stopping cancels the pending sleep immediately; a tick already running is
//! allowed to finish, and can check its [`StopSignal`] to discard its result.

use std::future::Future;
use std::time::Duration;

use log::{debug, trace};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep as TokioSleep;

/// What a tick wants the loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Finish,
}

/// Read side of a task's cancellation flag.
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop has been requested (or the task handle is gone).
    pub async fn stopped(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Handle to a running repeating task. Dropping the handle stops the task.
pub struct RepeatingTask {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTask {
    /// Spawn a loop that sleeps `interval`, then awaits `tick`, forever or until
    /// the tick returns [`TickOutcome::Finish`] or [`stop`](Self::stop) is called.
    pub fn start<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut(StopSignal) -> Fut + Send + 'static,
        Fut: Future<Output = TickOutcome> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let signal = StopSignal { rx: stop_rx };

        let handle = tokio::spawn(async move {
            debug!("{name} task started (interval {interval:?})");
            let mut waiter = signal.clone();

            loop {
                tokio::select! {
                    _ = waiter.stopped() => break,
                    _ = TokioSleep(interval) => {}
                }

                if signal.is_stopped() {
                    break;
                }

                trace!("{name} tick");
                if tick(signal.clone()).await == TickOutcome::Finish {
                    break;
                }
            }

            debug!("{name} task finished");
        });

        Self {
            name,
            stop_tx,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request cancellation. Idempotent.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Whether the loop is still scheduled or running a tick.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop and wait for the loop (including an in-flight tick) to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            debug!("{} task ended abnormally: {e}", self.name);
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}
