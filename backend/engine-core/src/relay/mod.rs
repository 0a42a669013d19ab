//! Control-channel relay between the UI and the sidecar.
//!
//! All UI commands share one persistent connection to the control port. Requests
//! queue on that connection's lock, so at most one is outstanding at a time and
//! replies are matched to requests in order. Any transport failure drops the
//! connection; the next command reconnects from scratch.

pub mod export;
pub mod render;

pub use export::{ExportProgress, ExportStatus};
pub use render::{RenderGuard, RenderTracker, RenderWatch};

use crate::config::RelayConfig;
use crate::error::transport::TransportError;
use crate::events::{EventBus, HostEvent};
use crate::protocol::{
    self, EXPORT_CANCEL, EXPORT_START, EXPORT_STATUS, EngineCommand, EngineResponse,
};
use crate::session::EngineSession;
use crate::task::{RepeatingTask, StopSignal, TickOutcome};
use crate::transport::{Connector, RequestSlot};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use log::{debug, info, warn};
use tokio::sync::Mutex as TokioMutex;
use tokio::time::timeout as TokioTimeout;
use uuid::Uuid;

pub const ENGINE_NOT_CONNECTED: &str = "engine not connected";

const EXPORT_POLL_TASK: &str = "export-poll";

/// A connected slot tagged with the generation it was opened for.
struct Connection {
    generation: u64,
    slot: RequestSlot,
}

struct RelayInner {
    config: RelayConfig,
    connector: Arc<dyn Connector>,
    session: RwLock<Option<EngineSession>>,
    connection: TokioMutex<Option<Connection>>,
    render: RenderTracker,
    events: EventBus,
    export_poll: Mutex<Option<RepeatingTask>>,
}

/// Cloneable handle; clones share the connection and session.
#[derive(Clone)]
pub struct CommandRelay {
    inner: Arc<RelayInner>,
}

impl CommandRelay {
    pub fn new(connector: Arc<dyn Connector>, config: RelayConfig, events: EventBus) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                config,
                connector,
                session: RwLock::new(None),
                connection: TokioMutex::new(None),
                render: RenderTracker::new(),
                events,
                export_poll: Mutex::new(None),
            }),
        }
    }

    pub fn session(&self) -> Option<EngineSession> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn current_generation(&self) -> Option<u64> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(EngineSession::generation)
    }

    pub fn is_connected(&self) -> bool {
        self.current_generation().is_some()
    }

    pub fn render_watch(&self) -> RenderWatch {
        self.inner.render.watch()
    }

    /// Point the relay at a new sidecar generation.
    ///
    /// An idle connection to the old generation is dropped right away; one that
    /// is mid-request is dropped by its owner once it notices the generation
    /// changed. Render activity from the old generation is forgotten.
    pub fn rebind(&self, session: EngineSession) {
        info!(
            "Relay bound to engine generation {} (control port {})",
            session.generation(),
            session.descriptor().control_port
        );
        self.set_session(Some(session));
    }

    /// Forget the current session. Commands fail with
    /// [`ENGINE_NOT_CONNECTED`] until the next [`rebind`](Self::rebind).
    pub fn disconnect(&self) {
        if self.is_connected() {
            info!("Relay disconnected from engine");
        }
        self.set_session(None);
    }

    fn set_session(&self, session: Option<EngineSession>) {
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session;

        if let Ok(mut connection) = self.inner.connection.try_lock() {
            *connection = None;
        }
        self.inner.render.reset();
    }

    /// Send one command and wait for its reply.
    ///
    /// Never fails: transport problems are folded into an
    /// `EngineResponse { ok: false, error }`.
    pub async fn send(&self, command: EngineCommand) -> EngineResponse {
        let id = Uuid::new_v4().to_string();

        // Cancelling stops local polling even when the engine is gone.
        if command.name() == EXPORT_CANCEL {
            self.stop_export_poll();
        }

        if !self.is_connected() {
            debug!("Rejecting {}: {ENGINE_NOT_CONNECTED}", command.name());
            return EngineResponse::failure(Some(id), ENGINE_NOT_CONNECTED);
        }

        let result = self.round_trip(&command, &id).await;

        let response = match result {
            Ok(response) => response,
            Err(TransportError::NotConnected { .. }) => {
                EngineResponse::failure(Some(id), ENGINE_NOT_CONNECTED)
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!("Command {} timed out: {e}", command.name());
                } else {
                    warn!("Command {} failed: {e}", command.name());
                }
                EngineResponse::failure(Some(id), format!("{}: {e}", e.error_category()))
            }
        };

        if command.name() == EXPORT_START && response.ok {
            self.start_export_poll();
        }

        response
    }

    async fn round_trip(
        &self,
        command: &EngineCommand,
        id: &str,
    ) -> Result<EngineResponse, TransportError> {
        let mut queued = self.inner.connection.lock().await;

        // The session may have changed while this request waited its turn.
        let session = self
            .session()
            .ok_or_else(|| TransportError::not_connected(ENGINE_NOT_CONNECTED))?;
        let request = protocol::encode_request(command, id, session.token())?;

        // Taken under the connection lock so the guard belongs to the epoch of
        // the generation that actually runs the command.
        let _render_guard = command
            .is_heavy()
            .then(|| self.inner.render.begin(command.name()));

        let mut connection = match queued.take() {
            Some(connection)
                if connection.generation == session.generation()
                    && connection.slot.is_reusable() =>
            {
                connection
            }
            stale => {
                if stale.is_some() {
                    debug!("Discarding stale control connection");
                }
                self.connect(&session).await?
            }
        };

        debug!("-> {} ({id})", command.name());
        let raw = connection
            .slot
            .request(request, self.inner.config.command_timeout())
            .await?;
        let response = protocol::decode_response(&raw, id)?;
        debug!("<- {} ({id}) ok={}", command.name(), response.ok);

        if self.current_generation() == Some(connection.generation) {
            *queued = Some(connection);
        }
        Ok(response)
    }

    async fn connect(&self, session: &EngineSession) -> Result<Connection, TransportError> {
        let port = session.descriptor().control_port;
        let timeout = self.inner.config.command_timeout();

        let channel = TokioTimeout(timeout, self.inner.connector.connect(port))
            .await
            .map_err(|_| TransportError::timeout(format!("connect to port {port}"), timeout))??;

        debug!("Control connection opened on port {port}");
        Ok(Connection {
            generation: session.generation(),
            slot: RequestSlot::new(channel),
        })
    }

    fn export_poll(&self) -> MutexGuard<'_, Option<RepeatingTask>> {
        self.inner
            .export_poll
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether an export poll loop is currently scheduled.
    pub fn is_export_polling(&self) -> bool {
        self.export_poll()
            .as_ref()
            .is_some_and(|task| task.is_running() && !task.is_stopped())
    }

    fn start_export_poll(&self) {
        let relay = Arc::downgrade(&self.inner);
        let task = RepeatingTask::start(
            EXPORT_POLL_TASK,
            self.inner.config.export_poll_interval(),
            move |stop| poll_export(Weak::clone(&relay), stop),
        );

        if let Some(previous) = self.export_poll().replace(task) {
            previous.stop();
            debug!("New export supersedes the previous poll loop");
        }
        info!("Export started, polling status");
    }

    /// Stop the export poll loop, discarding any status request in flight.
    pub fn stop_export_poll(&self) {
        if let Some(task) = self.export_poll().take() {
            task.stop();
            debug!("Export polling stopped");
        }
    }

    /// Stop background work and drop the connection.
    pub async fn shutdown(&self) {
        let poll = self.export_poll().take();
        if let Some(task) = poll {
            task.shutdown().await;
        }
        *self.inner.connection.lock().await = None;
    }
}

async fn poll_export(relay: Weak<RelayInner>, stop: StopSignal) -> TickOutcome {
    let Some(inner) = relay.upgrade() else {
        return TickOutcome::Finish;
    };
    let relay = CommandRelay { inner };

    let response = relay.send(EngineCommand::new(EXPORT_STATUS)).await;
    if stop.is_stopped() {
        debug!("Discarding export status received after polling stopped");
        return TickOutcome::Finish;
    }

    if !response.ok && !response.fields.contains_key("status") {
        if !relay.is_connected() {
            relay
                .inner
                .events
                .publish(HostEvent::ExportProgress(ExportProgress::aborted(
                    ENGINE_NOT_CONNECTED,
                )));
            return TickOutcome::Finish;
        }
        warn!(
            "Export status poll failed, will retry: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
        return TickOutcome::Continue;
    }

    let progress = ExportProgress::from_response(&response);
    let done = progress.done;
    if done {
        info!("Export finished with status {:?}", progress.status);
    }
    relay.inner.events.publish(HostEvent::ExportProgress(progress));

    if done {
        TickOutcome::Finish
    } else {
        TickOutcome::Continue
    }
}
