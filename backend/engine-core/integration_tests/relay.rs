use crate::support::{FakeEngine, FakeReply, ok_reply, spawn_ws_engine, test_session};

use engine_core::config::RelayConfig;
use engine_core::events::{EventBus, HostEvent};
use engine_core::protocol::EngineCommand;
use engine_core::relay::{CommandRelay, ENGINE_NOT_CONNECTED, ExportProgress, ExportStatus};
use engine_core::transport::WsConnector;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::TryRecvError;

const CONTROL_PORT: u16 = 7000;
const HEALTH_PORT: u16 = 7001;

fn relay_config() -> RelayConfig {
    RelayConfig {
        command_timeout_ms: 1_000,
        export_poll_interval_ms: 500,
    }
}

fn connected_relay(engine: &FakeEngine, events: &EventBus) -> CommandRelay {
    let relay = CommandRelay::new(Arc::new(engine.clone()), relay_config(), events.clone());
    relay.rebind(test_session(1, CONTROL_PORT, HEALTH_PORT));
    relay
}

async fn next_progress(events: &mut Receiver<HostEvent>) -> ExportProgress {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus closed");
        if let HostEvent::ExportProgress(progress) = event {
            return progress;
        }
    }
}

fn assert_no_more_progress(events: &mut Receiver<HostEvent>) {
    loop {
        match events.try_recv() {
            Ok(HostEvent::ExportProgress(progress)) => {
                panic!("unexpected progress event: {progress:?}")
            }
            Ok(_) => continue,
            Err(TryRecvError::Empty) => return,
            Err(e) => panic!("event bus error: {e}"),
        }
    }
}

// ============================================================================
// Connection handling
// ============================================================================

/// **VALUE**: Commands without a session fail fast with a structured response.
///
/// **WHY THIS MATTERS**: While the engine is down the UI keeps sending commands; each must get
/// an answer it can show instead of hanging or panicking.
///
/// **BUG THIS CATCHES**: Would catch attempting a connection with no session, or returning an
/// error type the UI cannot display.
#[tokio::test]
async fn given_no_session_when_sending_then_returns_not_connected_response() {
    // GIVEN: A relay that was never bound
    let engine = FakeEngine::new(|_, _| ok_reply());
    let relay = CommandRelay::new(Arc::new(engine.clone()), relay_config(), EventBus::default());

    // WHEN: Sending a command
    let response = relay.send(EngineCommand::new("list_effects")).await;

    // THEN: ok = false with the not-connected message, and nothing was dialled
    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some(ENGINE_NOT_CONNECTED));
    assert!(response.id.is_some());
    assert!(engine.connections().is_empty());
}

/// **VALUE**: Every request carries a fresh id and the session token.
///
/// **BUG THIS CATCHES**: Would catch reusing ids (breaking correlation) or sending the token
/// from a previous generation.
#[tokio::test]
async fn given_session_when_sending_then_request_is_stamped_with_id_and_token() {
    let engine = FakeEngine::new(|_, _| FakeReply::Json(json!({"ok": true, "effects": ["blur"]})));
    let relay = connected_relay(&engine, &EventBus::default());

    let first = relay.send(EngineCommand::new("list_effects")).await;
    let second = relay.send(EngineCommand::new("list_effects")).await;

    let requests = engine.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].0, CONTROL_PORT);
    assert_eq!(requests[0].1["_token"], "test-token-12345-1");
    assert_eq!(requests[0].1["id"], first.id.clone().unwrap().as_str());
    assert_ne!(first.id, second.id);
    assert!(first.ok);
    assert_eq!(first.field("effects"), Some(&json!(["blur"])));
}

/// **VALUE**: Successive commands share one persistent connection.
///
/// **BUG THIS CATCHES**: Would catch reconnecting for every command.
#[tokio::test]
async fn given_successful_commands_when_sending_again_then_connection_is_reused() {
    let engine = FakeEngine::new(|_, _| ok_reply());
    let relay = connected_relay(&engine, &EventBus::default());

    for _ in 0..3 {
        assert!(relay.send(EngineCommand::new("clock_status")).await.ok);
    }

    assert_eq!(engine.connections(), vec![CONTROL_PORT]);
}

/// **VALUE**: After a transport error the next command gets a new connection.
///
/// **WHY THIS MATTERS**: A strictly alternating socket that lost a reply is stuck forever; the
/// only recovery is a fresh socket.
///
/// **BUG THIS CATCHES**: Would catch keeping the failed connection around, which makes every
/// later command fail too.
#[tokio::test]
async fn given_transport_error_when_sending_next_command_then_uses_new_connection() {
    // GIVEN: An engine whose first reply fails
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let engine = FakeEngine::new(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            FakeReply::Fail
        } else {
            ok_reply()
        }
    });
    let relay = connected_relay(&engine, &EventBus::default());

    // WHEN: One failed command, then another
    let failed = relay.send(EngineCommand::new("list_effects")).await;
    let recovered = relay.send(EngineCommand::new("list_effects")).await;

    // THEN: First reported as an io failure, second succeeded on a second connection
    assert!(!failed.ok);
    assert!(failed.error.as_deref().unwrap().starts_with("io"));
    assert!(recovered.ok);
    assert_eq!(engine.connections_to(CONTROL_PORT), 2);
}

/// **VALUE**: A command that gets no reply fails with a timeout and the connection is replaced.
#[tokio::test(start_paused = true)]
async fn given_unanswered_command_when_timeout_elapses_then_fails_and_reconnects() {
    let engine = FakeEngine::new(|_, request| {
        if request["cmd"] == "slow" {
            FakeReply::Hang
        } else {
            ok_reply()
        }
    });
    let relay = connected_relay(&engine, &EventBus::default());

    let timed_out = relay.send(EngineCommand::new("slow")).await;
    let next = relay.send(EngineCommand::new("fast")).await;

    assert!(!timed_out.ok);
    assert!(timed_out.error.as_deref().unwrap().starts_with("timeout"));
    assert!(next.ok);
    assert_eq!(engine.connections_to(CONTROL_PORT), 2);
}

/// **VALUE**: A reply to some other request tears the connection down.
///
/// **BUG THIS CATCHES**: Would catch accepting a stale reply left over from a timed out request
/// as the answer to the current one.
#[tokio::test]
async fn given_reply_with_wrong_id_when_sending_then_protocol_failure_and_reconnect() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let engine = FakeEngine::new(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            FakeReply::Json(json!({"id": "someone-else", "ok": true}))
        } else {
            ok_reply()
        }
    });
    let relay = connected_relay(&engine, &EventBus::default());

    let mismatched = relay.send(EngineCommand::new("seek")).await;
    let next = relay.send(EngineCommand::new("seek")).await;

    assert!(!mismatched.ok);
    assert!(mismatched.error.as_deref().unwrap().starts_with("protocol"));
    assert!(next.ok);
    assert_eq!(engine.connections_to(CONTROL_PORT), 2);
}

/// **VALUE**: Concurrent commands are queued and each gets its own reply.
///
/// **WHY THIS MATTERS**: The UI fires commands from several places at once; the socket only
/// allows one outstanding request.
///
/// **BUG THIS CATCHES**: Would catch interleaving two requests on one socket, which the engine
/// rejects, or handing one caller the other's reply.
#[tokio::test(start_paused = true)]
async fn given_concurrent_commands_when_sending_then_served_in_turn_on_one_connection() {
    let engine = FakeEngine::new(|_, request| {
        FakeReply::Delayed(
            Duration::from_millis(100),
            json!({"ok": true, "echo": request["cmd"].clone()}),
        )
    });
    let relay = connected_relay(&engine, &EventBus::default());

    let (a, b) = tokio::join!(
        relay.send(EngineCommand::new("audio_play")),
        relay.send(EngineCommand::new("audio_pause")),
    );

    assert_eq!(a.field("echo"), Some(&json!("audio_play")));
    assert_eq!(b.field("echo"), Some(&json!("audio_pause")));
    assert_eq!(engine.connections(), vec![CONTROL_PORT]);
}

/// **VALUE**: Rebinding switches port and token for the next command.
///
/// **WHY THIS MATTERS**: After a restart the engine listens on new ports with a new token;
/// commands sent to the old ones would fail forever.
///
/// **BUG THIS CATCHES**: Would catch reusing the old connection or token after a restart.
#[tokio::test]
async fn given_rebind_when_sending_then_uses_new_generation() {
    // GIVEN: A relay that already talked to generation 1
    let engine = FakeEngine::new(|_, _| ok_reply());
    let relay = connected_relay(&engine, &EventBus::default());
    relay.send(EngineCommand::new("list_effects")).await;

    // WHEN: Rebinding to generation 2 on other ports
    relay.rebind(test_session(2, 8000, 8001));
    let response = relay.send(EngineCommand::new("list_effects")).await;

    // THEN: New connection to the new port with the new token
    assert!(response.ok);
    assert_eq!(engine.connections(), vec![CONTROL_PORT, 8000]);
    let (port, request) = engine.requests().pop().unwrap();
    assert_eq!(port, 8000);
    assert_eq!(request["_token"], "test-token-12345-2");
}

/// **VALUE**: After `disconnect()` commands fail as not connected.
#[tokio::test]
async fn given_disconnected_relay_when_sending_then_returns_not_connected() {
    let engine = FakeEngine::new(|_, _| ok_reply());
    let relay = connected_relay(&engine, &EventBus::default());

    relay.disconnect();
    let response = relay.send(EngineCommand::new("list_effects")).await;

    assert!(!relay.is_connected());
    assert_eq!(response.error.as_deref(), Some(ENGINE_NOT_CONNECTED));
}

// ============================================================================
// Render activity
// ============================================================================

/// **VALUE**: A heavy command marks rendering for exactly as long as it is in flight.
///
/// **WHY THIS MATTERS**: The health monitor relaxes its miss limit while this flag is set.
///
/// **BUG THIS CATCHES**: Would catch the flag never being set, or never being cleared.
#[tokio::test(start_paused = true)]
async fn given_heavy_command_in_flight_when_checking_then_rendering() {
    // GIVEN: An engine that takes 5 s to render
    let engine = FakeEngine::new(|_, request| {
        if request["cmd"] == "render_frame" {
            FakeReply::Delayed(Duration::from_secs(5), json!({"ok": true}))
        } else {
            ok_reply()
        }
    });
    let relay = CommandRelay::new(
        Arc::new(engine.clone()),
        RelayConfig {
            command_timeout_ms: 30_000,
            export_poll_interval_ms: 500,
        },
        EventBus::default(),
    );
    relay.rebind(test_session(1, CONTROL_PORT, HEALTH_PORT));
    let watch = relay.render_watch();

    // WHEN: A render is in flight
    let sender = relay.clone();
    let render = tokio::spawn(async move { sender.send(EngineCommand::new("render_frame")).await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    // THEN: Rendering until the reply arrives
    assert!(watch.is_rendering());
    assert!(render.await.unwrap().ok);
    assert!(!watch.is_rendering());
}

/// **VALUE**: A heavy command that fails still clears the flag.
///
/// **BUG THIS CATCHES**: Would catch clearing the flag only on the success path, leaving crash
/// detection relaxed forever after one failed render.
#[tokio::test]
async fn given_heavy_command_fails_when_resolved_then_not_rendering() {
    let engine = FakeEngine::new(|_, _| FakeReply::Fail);
    let relay = connected_relay(&engine, &EventBus::default());
    let watch = relay.render_watch();

    let response = relay.send(EngineCommand::new("apply_chain")).await;

    assert!(!response.ok);
    assert!(!watch.is_rendering());
}

/// **VALUE**: Light commands never mark rendering.
#[tokio::test(start_paused = true)]
async fn given_light_command_in_flight_when_checking_then_not_rendering() {
    let engine = FakeEngine::new(|_, _| {
        FakeReply::Delayed(Duration::from_millis(500), json!({"ok": true}))
    });
    let relay = connected_relay(&engine, &EventBus::default());
    let watch = relay.render_watch();

    let sender = relay.clone();
    let pending = tokio::spawn(async move { sender.send(EngineCommand::new("list_effects")).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!watch.is_rendering());
    pending.await.unwrap();
}

/// **VALUE**: A heavy command that waited out a rebind counts as rendering on the new
/// generation.
///
/// **WHY THIS MATTERS**: A restart forgets render activity from the old generation. A render
/// queued across that restart runs on the new engine, and the health monitor must still
/// relax its miss limit for it.
///
/// **BUG THIS CATCHES**: Would catch marking the render before it reaches the connection, so
/// the restart invalidates its mark while the new engine is busy rendering.
#[tokio::test(start_paused = true)]
async fn given_heavy_command_queued_across_rebind_when_running_then_rendering() {
    // GIVEN: Generation 1 is busy with a slow light command; generation 2 renders slowly
    const NEW_CONTROL: u16 = 8000;
    let engine = FakeEngine::new(|port, request| match (port, request["cmd"].as_str()) {
        (CONTROL_PORT, _) => FakeReply::Delayed(Duration::from_secs(1), json!({"ok": true})),
        (NEW_CONTROL, Some("render_frame")) => {
            FakeReply::Delayed(Duration::from_secs(5), json!({"ok": true}))
        }
        _ => ok_reply(),
    });
    let relay = CommandRelay::new(
        Arc::new(engine.clone()),
        RelayConfig {
            command_timeout_ms: 30_000,
            export_poll_interval_ms: 500,
        },
        EventBus::default(),
    );
    relay.rebind(test_session(1, CONTROL_PORT, HEALTH_PORT));
    let watch = relay.render_watch();

    let sender = relay.clone();
    let light = tokio::spawn(async move { sender.send(EngineCommand::new("list_effects")).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let sender = relay.clone();
    let render = tokio::spawn(async move { sender.send(EngineCommand::new("render_frame")).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // WHEN: The engine is replaced while the render waits its turn
    relay.rebind(test_session(2, NEW_CONTROL, HEALTH_PORT + 1000));
    assert!(light.await.unwrap().ok);
    tokio::time::sleep(Duration::from_secs(1)).await;

    // THEN: The render runs on generation 2 and counts as rendering
    assert_eq!(engine.connections_to(NEW_CONTROL), 1);
    assert!(watch.is_rendering());
    assert!(render.await.unwrap().ok);
    assert!(!watch.is_rendering());
}

// ============================================================================
// Export polling
// ============================================================================

/// **VALUE**: Export progress is polled until the job completes, then polling stops.
///
/// **WHY THIS MATTERS**: The progress bar is driven entirely by these events, and an endless
/// poll loop would keep the control socket busy after every export.
///
/// **BUG THIS CATCHES**: Would catch polling that never starts, never stops, or skips the final
/// `done` event.
#[tokio::test(start_paused = true)]
async fn given_export_started_when_status_completes_then_two_events_and_polling_stops() {
    // GIVEN: An engine reporting 40 % then complete
    let polls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&polls);
    let engine = FakeEngine::new(move |_, request| match request["cmd"].as_str() {
        Some("export_status") => {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                FakeReply::Json(json!({"ok": true, "status": "running", "progress": 0.4}))
            } else {
                FakeReply::Json(json!({"ok": true, "status": "complete", "progress": 1.0}))
            }
        }
        _ => ok_reply(),
    });
    let events = EventBus::default();
    let mut observer = events.subscribe();
    let relay = connected_relay(&engine, &events);

    // WHEN: Starting an export
    let started = relay
        .send(EngineCommand::new("export_start").with_field("output_path", "/tmp/out.mp4"))
        .await;
    assert!(started.ok);
    assert!(relay.is_export_polling());

    // THEN: Exactly two progress events, the second one final
    let first = next_progress(&mut observer).await;
    assert_eq!(first.progress, 0.4);
    assert!(!first.done);

    let second = next_progress(&mut observer).await;
    assert!(second.done);
    assert_eq!(second.status, ExportStatus::Complete);

    // AND: No further status requests
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.count_cmd("export_status"), 2);
    assert!(!relay.is_export_polling());
    assert_no_more_progress(&mut observer);
}

/// **VALUE**: A failed `export_start` does not begin polling.
#[tokio::test(start_paused = true)]
async fn given_export_start_rejected_when_sent_then_no_polling() {
    let engine = FakeEngine::new(|_, _| {
        FakeReply::Json(json!({"ok": false, "error": "no video loaded"}))
    });
    let relay = connected_relay(&engine, &EventBus::default());

    let response = relay.send(EngineCommand::new("export_start")).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(!response.ok);
    assert!(!relay.is_export_polling());
    assert_eq!(engine.count_cmd("export_status"), 0);
}

/// **VALUE**: `export_cancel` stops polling even though the last status was still running.
///
/// **BUG THIS CATCHES**: Would catch the poll loop only stopping on a terminal status, so a
/// cancelled export keeps polling until the engine reports `cancelled`.
#[tokio::test(start_paused = true)]
async fn given_running_export_when_cancelled_then_polling_stops_immediately() {
    // GIVEN: An export that is always running
    let engine = FakeEngine::new(|_, request| match request["cmd"].as_str() {
        Some("export_status") => {
            FakeReply::Json(json!({"ok": true, "status": "running", "progress": 0.1}))
        }
        Some("export_cancel") => FakeReply::Json(json!({"ok": true, "cancelled": true})),
        _ => ok_reply(),
    });
    let events = EventBus::default();
    let mut observer = events.subscribe();
    let relay = connected_relay(&engine, &events);
    relay.send(EngineCommand::new("export_start")).await;
    next_progress(&mut observer).await;

    // WHEN: Cancelling
    let cancelled = relay.send(EngineCommand::new("export_cancel")).await;
    let polls_at_cancel = engine.count_cmd("export_status");
    tokio::time::sleep(Duration::from_secs(5)).await;

    // THEN: No more polls and no more events
    assert!(cancelled.ok);
    assert!(!relay.is_export_polling());
    assert_eq!(engine.count_cmd("export_status"), polls_at_cancel);
    assert_no_more_progress(&mut observer);
}

/// **VALUE**: A status reply that arrives after cancel is discarded.
///
/// **WHY THIS MATTERS**: Showing "running 10 %" after the user pressed cancel makes the
/// progress bar jump back to life.
///
/// **BUG THIS CATCHES**: Would catch publishing the in-flight poll's result after cancellation.
#[tokio::test(start_paused = true)]
async fn given_status_poll_in_flight_when_cancelled_then_result_is_discarded() {
    // GIVEN: Status replies take 2 s
    let engine = FakeEngine::new(|_, request| match request["cmd"].as_str() {
        Some("export_status") => FakeReply::Delayed(
            Duration::from_secs(2),
            json!({"ok": true, "status": "running", "progress": 0.1}),
        ),
        _ => ok_reply(),
    });
    let events = EventBus::default();
    let mut observer = events.subscribe();
    let relay = CommandRelay::new(
        Arc::new(engine.clone()),
        RelayConfig {
            command_timeout_ms: 10_000,
            export_poll_interval_ms: 500,
        },
        events.clone(),
    );
    relay.rebind(test_session(1, CONTROL_PORT, HEALTH_PORT));
    relay.send(EngineCommand::new("export_start")).await;

    // WHEN: Cancelling while the first poll is in flight
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(engine.count_cmd("export_status"), 1);
    relay.send(EngineCommand::new("export_cancel")).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    // THEN: The late status never became an event
    assert_eq!(engine.count_cmd("export_status"), 1);
    assert_no_more_progress(&mut observer);
}

/// **VALUE**: A second export replaces the first poll loop instead of running two.
#[tokio::test(start_paused = true)]
async fn given_export_polling_when_new_export_started_then_single_loop_remains() {
    let engine = FakeEngine::new(|_, request| match request["cmd"].as_str() {
        Some("export_status") => {
            FakeReply::Json(json!({"ok": true, "status": "running", "progress": 0.5}))
        }
        _ => ok_reply(),
    });
    let relay = connected_relay(&engine, &EventBus::default());

    relay.send(EngineCommand::new("export_start")).await;
    relay.send(EngineCommand::new("export_start")).await;
    let before = engine.count_cmd("export_status");
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    let polls = engine.count_cmd("export_status") - before;

    // One loop at 500 ms gives 10 polls in 5.1 s; two loops would give about 20.
    assert!(relay.is_export_polling());
    assert!((9..=11).contains(&polls), "unexpected poll count {polls}");
    relay.stop_export_poll();
}

/// **VALUE**: Losing the engine ends polling with an error event.
#[tokio::test(start_paused = true)]
async fn given_export_polling_when_engine_disconnected_then_final_error_event() {
    let engine = FakeEngine::new(|_, request| match request["cmd"].as_str() {
        Some("export_status") => {
            FakeReply::Json(json!({"ok": true, "status": "running", "progress": 0.2}))
        }
        _ => ok_reply(),
    });
    let events = EventBus::default();
    let mut observer = events.subscribe();
    let relay = connected_relay(&engine, &events);
    relay.send(EngineCommand::new("export_start")).await;
    next_progress(&mut observer).await;

    relay.disconnect();
    let last = next_progress(&mut observer).await;

    assert!(last.done);
    assert_eq!(last.error.as_deref(), Some(ENGINE_NOT_CONNECTED));
}


/// **VALUE**: `export_cancel` stops polling even when the engine is not connected.
///
/// **WHY THIS MATTERS**: The user can press cancel during a restart. If the loop survives, it
/// resumes polling the next generation and reports progress for an export that was cancelled.
///
/// **BUG THIS CATCHES**: Would catch rejecting the command as not connected before the poll
/// loop is stopped.
#[tokio::test(start_paused = true)]
async fn given_export_polling_when_cancelled_while_disconnected_then_polling_stops() {
    // GIVEN: A running export on generation 1
    let engine = FakeEngine::new(|_, request| match request["cmd"].as_str() {
        Some("export_status") => {
            FakeReply::Json(json!({"ok": true, "status": "running", "progress": 0.3}))
        }
        _ => ok_reply(),
    });
    let events = EventBus::default();
    let mut observer = events.subscribe();
    let relay = connected_relay(&engine, &events);
    relay.send(EngineCommand::new("export_start")).await;
    next_progress(&mut observer).await;

    // WHEN: The engine drops and the user cancels before it comes back
    relay.disconnect();
    let cancelled = relay.send(EngineCommand::new("export_cancel")).await;
    let polls_at_cancel = engine.count_cmd("export_status");
    relay.rebind(test_session(2, CONTROL_PORT + 1000, HEALTH_PORT + 1000));
    tokio::time::sleep(Duration::from_secs(3)).await;

    // THEN: The command fails, but polling is over and nothing reaches the new generation
    assert_eq!(cancelled.error.as_deref(), Some(ENGINE_NOT_CONNECTED));
    assert!(!relay.is_export_polling());
    assert_eq!(engine.count_cmd("export_status"), polls_at_cancel);
    assert_no_more_progress(&mut observer);
}

// ============================================================================
// WebSocket transport
// ============================================================================

/// **VALUE**: End to end over a real loopback WebSocket.
///
/// **WHY THIS MATTERS**: All other relay tests use an in-memory engine; this one proves the
/// production transport frames requests and replies the same way.
///
/// **BUG THIS CATCHES**: Would catch URL construction errors or text/binary frame mix-ups in
/// the WebSocket channel.
#[tokio::test]
async fn given_websocket_engine_when_sending_then_receives_reply() {
    // GIVEN: A fake engine listening on a loopback port
    let (port, _server) = spawn_ws_engine(|request| match request["cmd"].as_str() {
        Some("list_effects") => json!({"ok": true, "effects": ["blur", "glitch"]}),
        _ => json!({"ok": false, "error": "unknown command"}),
    })
    .await;
    let relay = CommandRelay::new(
        Arc::new(WsConnector::default()),
        relay_config(),
        EventBus::default(),
    );
    relay.rebind(test_session(1, port, port));

    // WHEN: Sending two commands
    let effects = relay.send(EngineCommand::new("list_effects")).await;
    let unknown = relay.send(EngineCommand::new("bogus")).await;

    // THEN: Both answered over the same socket
    assert!(effects.ok, "unexpected failure: {:?}", effects.error);
    assert_eq!(effects.field("effects"), Some(&json!(["blur", "glitch"])));
    assert!(!unknown.ok);
    assert_eq!(unknown.error.as_deref(), Some("unknown command"));
}

/// **VALUE**: Nothing listening on the port yields a failed response, not a panic.
#[tokio::test]
async fn given_no_listener_when_sending_over_websocket_then_io_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let relay = CommandRelay::new(
        Arc::new(WsConnector::default()),
        relay_config(),
        EventBus::default(),
    );
    relay.rebind(test_session(1, port, port));

    let response = relay.send(EngineCommand::new("list_effects")).await;

    assert!(!response.ok);
    assert!(response.error.is_some());
}
