//! Process supervisor tests against fake sidecars written as shell scripts.
//!
//! Scripts are run through `sh` so the test never executes a file it has just
//! written.
#![cfg(unix)]

use crate::support::spawn_ws_engine;

use engine_core::config::{RelayConfig, SidecarConfig};
use engine_core::error::spawn::SpawnError;
use engine_core::events::EventBus;
use engine_core::protocol::EngineCommand;
use engine_core::relay::CommandRelay;
use engine_core::supervisor::{EngineLauncher, ProcessSupervisor};
use engine_core::transport::WsConnector;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

const ANNOUNCE_AND_WAIT: &str = r#"
echo "entropic-engine 0.4.1 starting"
echo "loading effects..."
echo "ZMQ_PORT=5555 ZMQ_PING_PORT=5556"
echo "ZMQ_TOKEN=s3cret-token"
echo "ready"
exec sleep 30
"#;

fn write_script(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("fake-engine.sh");
    std::fs::write(&path, body).unwrap();
    path
}

fn sidecar_config(script: &Path, startup_timeout_ms: u64) -> SidecarConfig {
    SidecarConfig {
        program: "sh".to_string(),
        args: vec![script.display().to_string()],
        startup_timeout_ms,
        max_output_lines: 20,
    }
}

fn supervisor_for(dir: &TempDir, body: &str, startup_timeout_ms: u64) -> ProcessSupervisor {
    let script = write_script(dir, body);
    ProcessSupervisor::new(
        sidecar_config(&script, startup_timeout_ms),
        dir.path().join("frames"),
    )
}

// ============================================================================
// Spawn
// ============================================================================

/// **VALUE**: A sidecar that announces its ports among other output yields a session.
///
/// **WHY THIS MATTERS**: The engine logs freely on stdout; the host must pick the
/// announcement out of that noise and keep the token intact.
///
/// **BUG THIS CATCHES**: Would catch giving up on the first non-announcement line, losing
/// the token, or not falling back to the configured frame path.
#[tokio::test]
async fn given_announcing_sidecar_when_spawned_then_session_has_ports_and_token() {
    // GIVEN: A script that prints noise around the announcement
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor_for(&dir, ANNOUNCE_AND_WAIT, 5_000);

    // WHEN: Spawning
    let session = supervisor.spawn().await.expect("spawn should succeed");

    // THEN: Ports, token, generation, pid and default frame path
    assert_eq!(session.generation(), 1);
    assert_eq!(session.descriptor().control_port, 5555);
    assert_eq!(session.descriptor().health_port, 5556);
    assert_eq!(session.token().as_str(), "s3cret-token");
    assert_eq!(session.shm_path(), Some(dir.path().join("frames").as_path()));
    assert!(session.pid().is_some());
    assert_eq!(supervisor.pid().await, session.pid());
    assert!(supervisor.is_running().await);

    assert!(supervisor.kill().await);
}

/// **VALUE**: A frame path announced by the sidecar overrides the configured default.
#[tokio::test]
async fn given_sidecar_announces_shm_path_when_spawned_then_announced_path_used() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor_for(
        &dir,
        r#"
echo "ZMQ_PORT=6000 ZMQ_PING_PORT=6001 ZMQ_TOKEN=t ZMQ_SHM_PATH=/dev/shm/entropic-42"
exec sleep 30
"#,
        5_000,
    );

    let session = supervisor.spawn().await.unwrap();

    assert_eq!(
        session.shm_path(),
        Some(Path::new("/dev/shm/entropic-42"))
    );
    supervisor.kill().await;
}

/// **VALUE**: Kill reports whether a sidecar was running.
///
/// **BUG THIS CATCHES**: Would catch a second kill claiming success, or a killed child still
/// being reported as running.
#[tokio::test]
async fn given_running_sidecar_when_killed_twice_then_second_kill_is_noop() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor_for(&dir, ANNOUNCE_AND_WAIT, 5_000);
    supervisor.spawn().await.unwrap();

    assert!(supervisor.kill().await);
    assert!(!supervisor.kill().await);
    assert!(!supervisor.is_running().await);
    assert_eq!(supervisor.pid().await, None);
}

/// **VALUE**: Restart replaces the child and bumps the generation.
///
/// **WHY THIS MATTERS**: The generation is how the relay and health probe tell stale
/// connections from fresh ones.
///
/// **BUG THIS CATCHES**: Would catch restart leaving the old child alive or reusing the
/// generation number.
#[tokio::test]
async fn given_running_sidecar_when_restarted_then_new_generation_and_pid() {
    // GIVEN: Generation 1 running
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor_for(&dir, ANNOUNCE_AND_WAIT, 5_000);
    let first = supervisor.spawn().await.unwrap();

    // WHEN: Restarting through the launcher interface
    let launcher: Arc<dyn EngineLauncher> = Arc::new(supervisor.clone());
    let second = launcher.restart().await.unwrap();

    // THEN: A new generation with a different process
    assert_eq!(second.generation(), 2);
    assert_eq!(supervisor.generation().await, 2);
    assert_ne!(first.pid(), second.pid());
    assert_eq!(supervisor.pid().await, second.pid());

    supervisor.kill().await;
}

// ============================================================================
// Failures
// ============================================================================

/// **VALUE**: A sidecar that never announces is killed after the startup timeout.
///
/// **BUG THIS CATCHES**: Would catch the host hanging forever on a wedged engine, or leaving
/// the silent child running.
#[tokio::test]
async fn given_silent_sidecar_when_spawned_then_times_out_and_child_killed() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor_for(&dir, "exec sleep 30\n", 300);

    let result = supervisor.spawn().await;

    assert!(
        matches!(result, Err(SpawnError::Timeout { .. })),
        "expected timeout, got {result:?}"
    );
    assert!(!supervisor.is_running().await);
    assert_eq!(supervisor.generation().await, 0);
}

/// **VALUE**: A sidecar that exits before announcing is reported as exited.
#[tokio::test]
async fn given_sidecar_exits_early_when_spawned_then_exited_error() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor_for(
        &dir,
        "echo \"fatal: no GPU found\"\necho \"ZMQ_PORT=5555\"\nexit 1\n",
        5_000,
    );

    let result = supervisor.spawn().await;

    match result {
        Err(SpawnError::Exited { message, .. }) => {
            assert!(message.contains("ZMQ_PING_PORT"), "message: {message}");
            assert!(message.contains("ZMQ_TOKEN"), "message: {message}");
        }
        other => panic!("expected exited error, got {other:?}"),
    }
}

/// **VALUE**: Output that never completes an announcement is cut off after the line limit.
///
/// **BUG THIS CATCHES**: Would catch reading a chatty engine's stdout forever instead of
/// failing the spawn.
#[tokio::test]
async fn given_chatty_sidecar_when_spawned_then_parse_error_after_line_limit() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor_for(
        &dir,
        "while true; do echo \"still loading\"; done\n",
        5_000,
    );

    let result = supervisor.spawn().await;

    assert!(
        matches!(result, Err(SpawnError::Parse { .. })),
        "expected parse error, got {result:?}"
    );
}

/// **VALUE**: An invalid port in the announcement fails the spawn.
#[tokio::test]
async fn given_invalid_port_when_spawned_then_parse_error() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor_for(
        &dir,
        "echo \"ZMQ_PORT=99999 ZMQ_PING_PORT=5556 ZMQ_TOKEN=t\"\nexec sleep 30\n",
        5_000,
    );

    let result = supervisor.spawn().await;

    assert!(
        matches!(result, Err(SpawnError::Parse { .. })),
        "expected parse error, got {result:?}"
    );
}

/// **VALUE**: A program that exists neither on `PATH` nor next to the host is a spawn error.
#[tokio::test]
async fn given_missing_program_when_spawned_then_spawn_error() {
    let supervisor = ProcessSupervisor::new(
        SidecarConfig {
            program: "entropic-engine-does-not-exist-7f3a".to_string(),
            ..SidecarConfig::default()
        },
        "/tmp/entropic-frames",
    );

    let result = supervisor.spawn().await;

    assert!(
        matches!(result, Err(SpawnError::Spawn { .. })),
        "expected spawn error, got {result:?}"
    );
    assert!(!supervisor.is_running().await);
}

// ============================================================================
// End to end
// ============================================================================

/// **VALUE**: A session from a real spawn drives the relay over WebSocket.
///
/// **WHY THIS MATTERS**: Ties the announcement format to the transport: the ports the
/// sidecar prints must be the ports the relay dials, with the announced token.
///
/// **BUG THIS CATCHES**: Would catch swapping the control and health ports, or the relay
/// stamping a token other than the announced one.
#[tokio::test]
async fn given_spawned_sidecar_when_relay_rebound_then_commands_reach_engine() {
    // GIVEN: A WebSocket engine and a sidecar script announcing its port
    let (port, _server) = spawn_ws_engine(|request| {
        if request["_token"] == "e2e-token" {
            json!({"ok": true, "frame": 12})
        } else {
            json!({"ok": false, "error": "invalid token"})
        }
    })
    .await;

    let dir = TempDir::new().unwrap();
    let supervisor = supervisor_for(
        &dir,
        &format!(
            "echo \"ZMQ_PORT={port} ZMQ_PING_PORT={port} ZMQ_TOKEN=e2e-token\"\nexec sleep 30\n"
        ),
        5_000,
    );
    let session = supervisor.spawn().await.unwrap();

    // WHEN: Binding a relay to the new session and sending a command
    let relay = CommandRelay::new(
        Arc::new(WsConnector::default()),
        RelayConfig::default(),
        EventBus::default(),
    );
    relay.rebind(session);
    let response = relay
        .send(EngineCommand::new("seek").with_field("frame", json!(12)))
        .await;

    // THEN: The engine accepted the token and answered
    assert!(response.ok, "unexpected failure: {:?}", response.error);
    assert_eq!(response.field("frame"), Some(&json!(12)));

    supervisor.kill().await;
}
