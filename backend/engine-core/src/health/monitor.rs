use crate::config::HealthConfig;
use crate::error::transport::TransportError;
use crate::events::{EventBus, HostEvent};
use crate::frame_ring::FrameFeed;
use crate::health::probe::HealthProbe;
use crate::health::{HealthStatus, MissCounter};
use crate::protocol::PingReply;
use crate::relay::{CommandRelay, RenderWatch};
use crate::session::EngineSession;
use crate::supervisor::EngineLauncher;
use crate::task::{RepeatingTask, StopSignal, TickOutcome};
use crate::transport::Connector;

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::watch;

const HEALTH_TASK: &str = "health-monitor";

/// Periodic liveness checks with automatic sidecar restart.
///
/// One probe per interval on the health port. Consecutive failures are counted;
/// reaching the limit (the larger render limit while a heavy command is in
/// flight) restarts the sidecar, rebinds the relay and remaps the frame ring.
///
/// The current [`HealthStatus`] is always readable through
/// [`subscribe`](Self::subscribe); state changes are also published on the
/// [`EventBus`].
pub struct HealthMonitor {
    core: Arc<TokioMutex<MonitorCore>>,
    status_rx: watch::Receiver<HealthStatus>,
    task: Option<RepeatingTask>,
}

struct MonitorCore {
    config: HealthConfig,
    probe: HealthProbe,
    misses: MissCounter,
    session: Option<EngineSession>,
    launcher: Arc<dyn EngineLauncher>,
    relay: CommandRelay,
    render: RenderWatch,
    frames: FrameFeed,
    events: EventBus,
    status_tx: watch::Sender<HealthStatus>,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        connector: Arc<dyn Connector>,
        launcher: Arc<dyn EngineLauncher>,
        relay: CommandRelay,
        frames: FrameFeed,
        events: EventBus,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(HealthStatus::default());
        let core = MonitorCore {
            misses: MissCounter::new(config.max_misses),
            probe: HealthProbe::new(connector),
            session: None,
            render: relay.render_watch(),
            config,
            launcher,
            relay,
            frames,
            events,
            status_tx,
        };

        Self {
            core: Arc::new(TokioMutex::new(core)),
            status_rx,
            task: None,
        }
    }

    /// Start probing `session`. With `None` the monitor starts disconnected and
    /// the first restart happens once the miss limit is reached.
    pub async fn start(&mut self, session: Option<EngineSession>) {
        self.stop();

        let interval = {
            let mut core = self.core.lock().await;
            core.misses.reset();
            core.probe.reset();
            let status = match &session {
                Some(session) => HealthStatus::connected(None, session.generation()),
                None => HealthStatus::disconnected(None),
            };
            core.session = session;
            core.set_status(status);
            core.config.interval()
        };

        let core = Arc::clone(&self.core);
        self.task = Some(RepeatingTask::start(HEALTH_TASK, interval, move |stop| {
            let core = Arc::clone(&core);
            async move { core.lock().await.tick(&stop).await }
        }));
        info!("Health monitor started (interval {interval:?})");
    }

    /// Cancel the next scheduled probe. A probe already in flight completes
    /// but its result is ignored.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.stop();
            info!("Health monitor stopped");
        }
    }

    /// Stop and wait for an in-flight probe or restart to finish.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.shutdown().await;
            info!("Health monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(RepeatingTask::is_running)
    }

    pub fn status(&self) -> HealthStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.status_rx.clone()
    }

    /// Consecutive misses recorded so far.
    pub async fn miss_count(&self) -> u32 {
        self.core.lock().await.misses.count()
    }

    pub async fn session(&self) -> Option<EngineSession> {
        self.core.lock().await.session.clone()
    }
}

impl MonitorCore {
    fn generation(&self) -> Option<u64> {
        self.session.as_ref().map(EngineSession::generation)
    }

    async fn tick(&mut self, stop: &StopSignal) -> TickOutcome {
        let result = match self.session.clone() {
            Some(session) => {
                self.probe
                    .ping(&session, self.config.probe_timeout())
                    .await
            }
            None => Err(TransportError::not_connected("no engine session")),
        };

        if stop.is_stopped() {
            debug!("Discarding health probe result, monitor stopped");
            return TickOutcome::Finish;
        }

        match result {
            Ok(reply) => self.on_alive(reply),
            Err(e) => self.on_miss(e).await,
        }
        TickOutcome::Continue
    }

    fn on_alive(&mut self, reply: PingReply) {
        if self.misses.count() > 0 {
            info!(
                "Engine answered after {} missed ping(s)",
                self.misses.count()
            );
        }
        self.misses.hit();

        if let Some(generation) = self.generation() {
            self.set_status(HealthStatus::connected(reply.uptime_s, generation));
        }
    }

    async fn on_miss(&mut self, error: TransportError) {
        let rendering = self.render.is_rendering();
        let limit = if rendering {
            self.config.render_max_misses
        } else {
            self.config.max_misses
        };
        let exhausted = self.misses.miss_with_limit(limit);

        warn!(
            "Health ping missed ({}/{limit}{}): {error}",
            self.misses.count(),
            if rendering { ", render in flight" } else { "" }
        );

        if exhausted {
            self.restart().await;
        } else {
            self.set_status(HealthStatus::disconnected(self.generation()));
        }
    }

    async fn restart(&mut self) {
        warn!("Engine unresponsive, restarting");
        self.set_status(HealthStatus::restarting(self.generation()));
        self.misses.reset();
        self.probe.reset();

        // The new generation may recreate the ring file in place; the old
        // mapping must be gone before the sidecar is killed.
        self.frames.close();
        debug!("Frame ring closed for restart");

        match self.launcher.restart().await {
            Ok(session) => {
                self.relay.rebind(session.clone());

                if let Some(path) = session.shm_path()
                    && let Err(e) = self
                        .frames
                        .reopen_with_backoff(path, self.config.frame_reopen_timeout())
                        .await
                {
                    warn!("Frame ring unavailable after restart: {e}");
                }

                info!(
                    "Engine restarted as generation {} (pid {:?})",
                    session.generation(),
                    session.pid()
                );
                let generation = session.generation();
                self.session = Some(session);
                self.set_status(HealthStatus::connected(None, generation));
            }
            Err(e) => {
                error!("Engine restart failed: {e}");
                self.relay.disconnect();
                self.session = None;
                self.set_status(HealthStatus::disconnected(None));
            }
        }
    }

    /// Publish `status`; observers on the event bus only hear about changes of
    /// state, the watch channel always carries the latest uptime.
    fn set_status(&self, status: HealthStatus) {
        let previous = self.status_tx.send_replace(status.clone());
        if previous.state != status.state || previous.generation != status.generation {
            info!("Engine health: {} -> {}", previous.state, status.state);
            self.events.publish(HostEvent::Health(status));
        }
    }
}
