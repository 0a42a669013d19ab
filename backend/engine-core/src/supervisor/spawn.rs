use crate::config::SidecarConfig;
use crate::error::spawn::SpawnError;
use crate::supervisor::announcement::{Announcement, AnnouncementParser};

use std::env::current_exe;
use std::ffi::OsStr;
use std::io::{Error as IoError, ErrorKind};
use std::process::Stdio;

use log::{debug, info, trace};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child as TokioChild;
use tokio::process::Command as TokioCommand;
use tokio::spawn as TokioSpawn;

pub(crate) fn build_spawn_command(program: impl AsRef<OsStr>, args: &[String]) -> TokioCommand {
    let mut cmd = TokioCommand::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Start the sidecar from `PATH`, falling back to a binary next to the host
/// executable.
pub(crate) fn spawn_sidecar_process(config: &SidecarConfig) -> Result<TokioChild, SpawnError> {
    debug!("Attempting to spawn {}", config.program);

    match build_spawn_command(&config.program, &config.args).spawn() {
        Ok(child) => {
            info!("Spawned {} (PID: {:?})", config.program, child.id());
            Ok(child)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("{} not in PATH, trying local binary", config.program);
            spawn_local_binary(config)
        }
        Err(err) => Err(SpawnError::spawn(
            format!("Failed to spawn {}: {err}", config.program),
            err,
        )),
    }
}

fn spawn_local_binary(config: &SidecarConfig) -> Result<TokioChild, SpawnError> {
    let exe = current_exe().map_err(|e| {
        SpawnError::spawn(format!("Failed to get current executable path: {e}"), e)
    })?;

    let dir = exe.parent().ok_or_else(|| {
        SpawnError::spawn(
            format!("Executable has no parent directory: {}", exe.display()),
            IoError::new(ErrorKind::NotFound, "no parent dir"),
        )
    })?;

    let local_path = dir.join(&config.program);
    debug!("Attempting to spawn from {}", local_path.display());

    let child = build_spawn_command(&local_path, &config.args)
        .current_dir(dir)
        .spawn()
        .map_err(|e| {
            SpawnError::spawn(
                format!(
                    "Failed to spawn {} from {}: {e}",
                    config.program,
                    local_path.display()
                ),
                e,
            )
        })?;

    info!("Spawned {} (PID: {:?})", local_path.display(), child.id());
    Ok(child)
}

/// Read the child's stdout until it has announced its ports and token.
///
/// Stderr is drained in the background from the start; the rest of stdout is
/// drained once the announcement is complete.
///
/// # Errors
///
/// - [`SpawnError::Exited`] if stdout closes first
/// - [`SpawnError::Parse`] for a malformed port or after `max_lines` lines
///   without a complete announcement
pub(crate) async fn read_announcement(
    child: &mut TokioChild,
    max_lines: usize,
) -> Result<Announcement, SpawnError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SpawnError::parse("Child process has no stdout"))?;

    if let Some(stderr) = child.stderr.take() {
        drain_lines(stderr, "stderr");
    }

    let mut lines = BufReader::new(stdout).lines();
    let mut parser = AnnouncementParser::new();

    for _ in 0..max_lines {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!("Engine output: {line}");
                parser.feed(&line)?;

                if parser.is_complete() {
                    TokioSpawn(async move {
                        while let Ok(Some(line)) = lines.next_line().await {
                            trace!("Engine stdout: {line}");
                        }
                    });
                    return parser
                        .finish()
                        .ok_or_else(|| SpawnError::parse("Announcement incomplete"));
                }
            }
            Ok(None) => {
                return Err(SpawnError::exited(format!(
                    "Engine exited before announcing (missing {})",
                    parser.missing_keys().join(", ")
                )));
            }
            Err(e) => {
                return Err(SpawnError::parse(format!(
                    "Failed to read engine output: {e}"
                )));
            }
        }
    }

    Err(SpawnError::parse(format!(
        "No complete announcement in first {max_lines} lines of output (missing {})",
        parser.missing_keys().join(", ")
    )))
}

fn drain_lines<R>(reader: R, label: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    TokioSpawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            trace!("Engine {label}: {line}");
        }
    });
}
