use entropic::APP_DIR_NAME;
use entropic::error::HostError;
use entropic::host::Host;
use entropic::logger::initialize as LoggerInitialize;

use engine_core::config::HostConfig;
use engine_core::task::{RepeatingTask, TickOutcome};

use common::ErrorLocation;

use std::fs::create_dir_all;
use std::panic::Location;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use log::{error, info, trace, warn};
use tokio::signal::ctrl_c;
use tokio::sync::broadcast::error::RecvError;

/// Preview refresh period, roughly 60 fps.
const RENDER_INTERVAL: Duration = Duration::from_millis(16);

const LOG_SUBDIR: &str = "logs";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), HostError> {
    // A missing .env is normal outside development.
    dotenvy::dotenv().ok();

    let log_dir = app_dir(dirs::data_local_dir(), "data")?.join(LOG_SUBDIR);
    create_dir_all(&log_dir).map_err(|e| HostError::Host {
        message: format!("Failed to create log directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Initialize logger FIRST
    LoggerInitialize(&log_dir)?;

    info!("Entropic host starting");
    info!("Log directory: {}", log_dir.display());

    let config_dir = app_dir(dirs::config_dir(), "config")?;
    let config = HostConfig::load(&config_dir).map_err(|e| HostError::Core {
        message: e.to_string(),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let host = Host::start(config).await;

    let frames = host.frames().clone();
    let render_loop = RepeatingTask::start("render-loop", RENDER_INTERVAL, move |_| {
        let frames = frames.clone();
        async move {
            if let Some(frame) = frames.read_new() {
                trace!(
                    "Frame {} from slot {} ({} bytes)",
                    frame.write_index,
                    frame.slot,
                    frame.len()
                );
            }
            TickOutcome::Continue
        }
    });

    let mut events = host.subscribe();
    loop {
        tokio::select! {
            signal = ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!("Host event: {json}"),
                    Err(e) => warn!("Failed to serialize host event: {e}"),
                },
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {skipped} host events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    render_loop.shutdown().await;
    host.shutdown().await;
    info!("Entropic host stopped");
    Ok(())
}

fn app_dir(base: Option<PathBuf>, kind: &str) -> Result<PathBuf, HostError> {
    base.map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| HostError::Host {
            message: format!("Failed to get {kind} directory"),
            location: ErrorLocation::from(Location::caller()),
        })
}
