use entropic::host::Host;

use engine_core::config::{FramesConfig, HealthConfig, HostConfig, SidecarConfig};
use engine_core::frame_ring::{HEADER_SIZE, LENGTH_PREFIX_SIZE, RingHeader};
use engine_core::health::HealthState;
use engine_core::protocol::EngineCommand;
use engine_core::relay::ENGINE_NOT_CONNECTED;

use std::path::Path;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

fn host_config(program: &str, args: Vec<String>, shm_path: &Path) -> HostConfig {
    HostConfig {
        sidecar: SidecarConfig {
            program: program.to_string(),
            args,
            startup_timeout_ms: 5_000,
            max_output_lines: 20,
        },
        health: HealthConfig {
            frame_reopen_timeout_ms: 500,
            ..HealthConfig::default()
        },
        frames: FramesConfig {
            shm_path: Some(shm_path.to_path_buf()),
        },
        ..HostConfig::default()
    }
}

/// A ring of two 256-byte slots holding one frame in slot 0.
fn write_ring(path: &Path, payload: &[u8]) {
    let header = RingHeader {
        write_index: 1,
        frame_count: 1,
        slot_size: 256,
        ring_size: 2,
        width: 640,
        height: 360,
    };
    let mut bytes = vec![0u8; header.required_file_size() as usize];
    bytes[..HEADER_SIZE].copy_from_slice(&header.encode());
    let slot = header.slot_offset(0) as usize;
    bytes[slot..slot + LENGTH_PREFIX_SIZE].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes[slot + LENGTH_PREFIX_SIZE..slot + LENGTH_PREFIX_SIZE + payload.len()]
        .copy_from_slice(payload);
    std::fs::write(path, bytes).unwrap();
}

/// Minimal engine on a loopback port: answers pings, records every command.
async fn spawn_engine(received: Arc<Mutex<Vec<String>>>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let received = Arc::clone(&received);
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(Message::Text(text))) = ws.next().await {
                    let request: Value = serde_json::from_str(text.as_str()).unwrap();
                    let cmd = request["cmd"].as_str().unwrap_or_default().to_string();
                    received.lock().unwrap().push(cmd.clone());

                    let mut reply = match cmd.as_str() {
                        "ping" => json!({"status": "alive", "uptime_s": 1.0}),
                        _ => json!({"ok": true}),
                    };
                    reply["id"] = request["id"].clone();
                    if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    port
}

/// **VALUE**: A host whose engine cannot be started still comes up, reports itself
/// disconnected, answers commands with a failure, and shuts down cleanly.
///
/// **WHY THIS MATTERS**: A missing or broken engine binary must not crash the desktop app;
/// the UI has to stay usable and show that the engine is unavailable.
///
/// **BUG THIS CATCHES**: Would catch `Host::start` propagating the spawn error, the relay
/// hanging on a command with no session, or shutdown blocking on the absent child.
#[tokio::test]
async fn given_missing_engine_when_host_started_then_disconnected_and_commands_fail() {
    // GIVEN: A program that does not exist
    let dir = TempDir::new().unwrap();
    let config = host_config(
        "entropic-engine-missing-b81c",
        Vec::new(),
        &dir.path().join("frames"),
    );

    // WHEN: Starting the host
    let host = Host::start(config).await;

    // THEN: Disconnected, no frames, commands fail fast
    assert_eq!(host.health_status().state, HealthState::Disconnected);
    assert!(host.latest_frame().is_none());
    let response = host.send(EngineCommand::new("list_effects")).await;
    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some(ENGINE_NOT_CONNECTED));

    // AND: Shutdown completes
    host.shutdown().await;
}

/// **VALUE**: A host started against a real sidecar relays commands, reads frames from the
/// ring, and asks the engine to shut down on exit.
///
/// **WHY THIS MATTERS**: This is the whole happy path: announcement, relay binding, frame
/// mapping, and a graceful stop that gives the engine a chance to flush an export.
///
/// **BUG THIS CATCHES**: Would catch the frame feed not being attached after the first
/// spawn, or shutdown killing the engine without sending `shutdown`.
#[cfg(unix)]
#[tokio::test]
async fn given_running_engine_when_host_started_then_relays_commands_and_reads_frames() {
    // GIVEN: A WebSocket engine, a ring file and a sidecar script announcing both
    let received = Arc::new(Mutex::new(Vec::new()));
    let port = spawn_engine(Arc::clone(&received)).await;

    let dir = TempDir::new().unwrap();
    let ring = dir.path().join("frames");
    write_ring(&ring, &[0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]);

    let script = dir.path().join("engine.sh");
    std::fs::write(
        &script,
        format!(
            "echo \"ZMQ_PORT={port} ZMQ_PING_PORT={port} ZMQ_TOKEN=host-test\"\nexec sleep 30\n"
        ),
    )
    .unwrap();
    let config = host_config("sh", vec![script.display().to_string()], &ring);

    // WHEN: Starting the host and sending a command
    let host = Host::start(config).await;
    let response = host.send(EngineCommand::new("set_param")).await;

    // THEN: Connected, the command went through, the frame is readable once
    assert_eq!(host.health_status().state, HealthState::Connected);
    assert!(response.ok, "unexpected failure: {:?}", response.error);
    let frame = host.new_frame().expect("frame should be readable");
    assert!(frame.is_jpeg());
    assert_eq!(frame.len(), 7);
    assert!(host.new_frame().is_none());

    // WHEN: Shutting down
    host.shutdown().await;

    // THEN: The engine was asked to exit
    let received = received.lock().unwrap().clone();
    assert!(received.contains(&"set_param".to_string()));
    assert_eq!(received.last().map(String::as_str), Some("shutdown"));
}
