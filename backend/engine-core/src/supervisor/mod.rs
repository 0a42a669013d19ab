//! Sidecar process lifecycle.

pub mod announcement;
pub(crate) mod spawn;

pub use announcement::{Announcement, AnnouncementParser};

use crate::config::SidecarConfig;
use crate::error::spawn::SpawnError;
use crate::session::{ConnectionDescriptor, EngineSession};

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use log::{debug, info, warn};
use tokio::process::Child as TokioChild;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::timeout as TokioTimeout;

/// Something that can replace the running sidecar with a fresh generation.
pub trait EngineLauncher: Send + Sync {
    fn restart(&self) -> BoxFuture<'_, Result<EngineSession, SpawnError>>;
}

#[derive(Default)]
struct SupervisorState {
    child: Option<TokioChild>,
    generation: u64,
}

/// Owns the sidecar child process.
///
/// Cloning yields another handle to the same child. At most one child runs at
/// a time; spawning while one is alive kills it first.
#[derive(Clone)]
pub struct ProcessSupervisor {
    config: Arc<SidecarConfig>,
    default_shm_path: PathBuf,
    state: Arc<TokioMutex<SupervisorState>>,
}

impl ProcessSupervisor {
    /// `default_shm_path` is used when the sidecar does not announce its own
    /// frame file.
    pub fn new(config: SidecarConfig, default_shm_path: impl Into<PathBuf>) -> Self {
        Self {
            config: Arc::new(config),
            default_shm_path: default_shm_path.into(),
            state: Arc::new(TokioMutex::new(SupervisorState::default())),
        }
    }

    /// Start a sidecar and wait for its announcement.
    ///
    /// # Errors
    ///
    /// - [`SpawnError::Spawn`] if the process cannot be started
    /// - [`SpawnError::Timeout`] if it does not announce within the startup timeout
    /// - [`SpawnError::Exited`] if it exits before announcing
    /// - [`SpawnError::Parse`] if the announcement is malformed
    ///
    /// On any error the child is killed.
    pub async fn spawn(&self) -> Result<EngineSession, SpawnError> {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.child.take() {
            kill_child(previous).await;
        }

        let mut child = spawn::spawn_sidecar_process(&self.config)?;
        let timeout = self.config.startup_timeout();

        let announced = TokioTimeout(
            timeout,
            spawn::read_announcement(&mut child, self.config.max_output_lines),
        )
        .await;

        let announcement = match announced {
            Ok(Ok(announcement)) => announcement,
            Ok(Err(e)) => {
                kill_child(child).await;
                return Err(e);
            }
            Err(_) => {
                kill_child(child).await;
                return Err(SpawnError::timeout(format!(
                    "{} did not announce within {timeout:?}",
                    self.config.program
                )));
            }
        };

        state.generation += 1;
        let pid = child.id();
        let shm_path = announcement
            .shm_path
            .unwrap_or_else(|| self.default_shm_path.clone());

        info!(
            "Engine generation {} ready (PID: {pid:?}, control {}, health {}, frames {})",
            state.generation,
            announcement.control_port,
            announcement.health_port,
            shm_path.display()
        );

        let descriptor = ConnectionDescriptor::new(
            announcement.control_port,
            announcement.health_port,
            announcement.token,
        );
        state.child = Some(child);

        Ok(EngineSession::new(state.generation, descriptor)
            .with_shm_path(shm_path)
            .with_pid(pid))
    }

    /// Kill the running sidecar. Returns `false` if there was none.
    pub async fn kill(&self) -> bool {
        let child = self.state.lock().await.child.take();
        match child {
            Some(child) => {
                kill_child(child).await;
                true
            }
            None => false,
        }
    }

    pub async fn restart(&self) -> Result<EngineSession, SpawnError> {
        info!("Restarting {}", self.config.program);
        self.kill().await;
        self.spawn().await
    }

    pub async fn pid(&self) -> Option<u32> {
        self.state.lock().await.child.as_ref().and_then(TokioChild::id)
    }

    /// Whether a child is held and has not exited yet.
    pub async fn is_running(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.child.as_mut().map(TokioChild::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                debug!("Engine already exited: {status}");
                false
            }
            Some(Err(e)) => {
                warn!("Failed to query engine status: {e}");
                false
            }
            None => false,
        }
    }

    /// Generation of the most recent successful spawn, 0 before the first.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }
}

impl EngineLauncher for ProcessSupervisor {
    fn restart(&self) -> BoxFuture<'_, Result<EngineSession, SpawnError>> {
        Box::pin(ProcessSupervisor::restart(self))
    }
}

async fn kill_child(mut child: TokioChild) {
    let pid = child.id();
    match child.kill().await {
        Ok(()) => info!("Killed engine (PID: {pid:?})"),
        Err(e) => warn!("Failed to kill engine (PID: {pid:?}): {e}"),
    }
}
