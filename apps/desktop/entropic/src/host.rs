//! Wiring of the engine-core components into one running host.

use engine_core::config::HostConfig;
use engine_core::events::{EventBus, HostEvent};
use engine_core::frame_ring::{Frame, FrameFeed};
use engine_core::health::{HealthMonitor, HealthStatus};
use engine_core::protocol::{EngineCommand, EngineResponse, SHUTDOWN};
use engine_core::relay::CommandRelay;
use engine_core::session::EngineSession;
use engine_core::supervisor::ProcessSupervisor;
use engine_core::transport::{Connector, WsConnector};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, watch};
use tokio::time::timeout as TokioTimeout;

/// How long shutdown waits for the engine to acknowledge `shutdown`.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The running host: one sidecar, its relay, frame feed and health monitor.
///
/// This is the surface a UI layer talks to. Commands go through
/// [`send`](Self::send), frames come from [`latest_frame`](Self::latest_frame)
/// or [`new_frame`](Self::new_frame), and status changes arrive on
/// [`subscribe`](Self::subscribe).
pub struct Host {
    supervisor: ProcessSupervisor,
    relay: CommandRelay,
    frames: FrameFeed,
    events: EventBus,
    health: HealthMonitor,
}

impl Host {
    /// Spawn the sidecar and start supervising it over WebSocket.
    ///
    /// Never fails: if the first spawn does not succeed the host starts
    /// disconnected and the health monitor retries through its restart cycle.
    pub async fn start(config: HostConfig) -> Self {
        Self::start_with_connector(config, Arc::new(WsConnector::default())).await
    }

    /// Like [`start`](Self::start) with a caller-provided transport.
    pub async fn start_with_connector(config: HostConfig, connector: Arc<dyn Connector>) -> Self {
        let events = EventBus::default();
        let frames = FrameFeed::new();
        let supervisor =
            ProcessSupervisor::new(config.sidecar.clone(), config.frames.resolve_shm_path());
        let relay = CommandRelay::new(
            Arc::clone(&connector),
            config.relay.clone(),
            events.clone(),
        );

        let session = match supervisor.spawn().await {
            Ok(session) => {
                attach(&relay, &frames, &session, &config).await;
                Some(session)
            }
            Err(e) => {
                error!("Engine failed to start: {e}");
                None
            }
        };

        let mut health = HealthMonitor::new(
            config.health.clone(),
            connector,
            Arc::new(supervisor.clone()),
            relay.clone(),
            frames.clone(),
            events.clone(),
        );
        health.start(session).await;

        Self {
            supervisor,
            relay,
            frames,
            events,
            health,
        }
    }

    /// Forward a UI command to the engine.
    pub async fn send(&self, command: EngineCommand) -> EngineResponse {
        self.relay.send(command).await
    }

    /// Newest frame in the ring, if any.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.frames.read_latest()
    }

    /// Newest frame, skipping one already returned.
    pub fn new_frame(&self) -> Option<Frame> {
        self.frames.read_new()
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    pub fn watch_health(&self) -> watch::Receiver<HealthStatus> {
        self.health.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    pub fn relay(&self) -> &CommandRelay {
        &self.relay
    }

    pub fn frames(&self) -> &FrameFeed {
        &self.frames
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// Ask the engine to exit, then tear everything down.
    ///
    /// The `shutdown` command is best effort; the child is killed regardless.
    pub async fn shutdown(mut self) {
        info!("Host shutting down");
        self.health.shutdown().await;

        if self.relay.is_connected() {
            let request = self.relay.send(EngineCommand::new(SHUTDOWN));
            match TokioTimeout(SHUTDOWN_GRACE, request).await {
                Ok(response) if response.ok => debug!("Engine acknowledged shutdown"),
                Ok(response) => debug!("Engine shutdown request failed: {:?}", response.error),
                Err(_) => warn!("Engine did not acknowledge shutdown within {SHUTDOWN_GRACE:?}"),
            }
        }

        self.relay.shutdown().await;
        self.relay.disconnect();
        self.frames.close();

        if self.supervisor.kill().await {
            info!("Engine stopped");
        }
    }
}

/// Point the relay and frame feed at a freshly spawned session.
async fn attach(
    relay: &CommandRelay,
    frames: &FrameFeed,
    session: &EngineSession,
    config: &HostConfig,
) {
    relay.rebind(session.clone());

    if let Some(path) = session.shm_path()
        && let Err(e) = frames
            .reopen_with_backoff(path, config.health.frame_reopen_timeout())
            .await
    {
        warn!("Frame ring unavailable, preview stays empty until restart: {e}");
    }
}
