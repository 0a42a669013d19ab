use crate::support::{
    FakeEngine, FakeLauncher, FakeReply, RingWriter, alive_reply, jpeg_frame, ok_reply,
    test_session,
};

use engine_core::config::{HealthConfig, RelayConfig};
use engine_core::events::{EventBus, HostEvent};
use engine_core::frame_ring::FrameFeed;
use engine_core::health::{HealthMonitor, HealthState};
use engine_core::protocol::EngineCommand;
use engine_core::relay::{CommandRelay, ENGINE_NOT_CONNECTED};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

const OLD_CONTROL: u16 = 7000;
const OLD_HEALTH: u16 = 7001;
const NEW_CONTROL: u16 = 8000;
const NEW_HEALTH: u16 = 8001;

fn health_config() -> HealthConfig {
    HealthConfig {
        interval_ms: 1_000,
        probe_timeout_ms: 2_000,
        max_misses: 3,
        render_max_misses: 10,
        frame_reopen_timeout_ms: 500,
    }
}

struct Harness {
    engine: FakeEngine,
    launcher: FakeLauncher,
    relay: CommandRelay,
    frames: FrameFeed,
    events: EventBus,
    monitor: HealthMonitor,
}

fn harness(engine: FakeEngine, relay_config: RelayConfig) -> Harness {
    let launcher = FakeLauncher::new();
    let events = EventBus::default();
    let frames = FrameFeed::new();
    let relay = CommandRelay::new(Arc::new(engine.clone()), relay_config, events.clone());
    relay.rebind(test_session(1, OLD_CONTROL, OLD_HEALTH));

    let monitor = HealthMonitor::new(
        health_config(),
        Arc::new(engine.clone()),
        Arc::new(launcher.clone()),
        relay.clone(),
        frames.clone(),
        events.clone(),
    );

    Harness {
        engine,
        launcher,
        relay,
        frames,
        events,
        monitor,
    }
}

async fn next_health_state(events: &mut Receiver<HostEvent>) -> (HealthState, Option<u64>) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(60), events.recv())
            .await
            .expect("timed out waiting for health event")
            .expect("event bus closed");
        if let HostEvent::Health(status) = event {
            return (status.state, status.generation);
        }
    }
}

/// Old generation's health port never answers; the new one is alive.
fn dead_then_alive(port: u16, _request: &serde_json::Value) -> FakeReply {
    match port {
        OLD_HEALTH => FakeReply::Hang,
        NEW_HEALTH => alive_reply(0.5),
        _ => ok_reply(),
    }
}

// ============================================================================
// Restart state machine
// ============================================================================

/// **VALUE**: Three timed out probes restart the engine and reconnect to the new generation.
///
/// **WHY THIS MATTERS**: This is the crash recovery path end to end: the user sees the status
/// go disconnected, restarting, connected, and commands reach the new engine afterwards.
///
/// **BUG THIS CATCHES**: Would catch restarting on the first miss, never restarting, skipping
/// the relay rebind, or forgetting to publish one of the transitions.
#[tokio::test(start_paused = true)]
async fn given_three_probe_timeouts_when_not_rendering_then_restarts_and_reconnects() {
    // GIVEN: Generation 1 stops answering pings; generation 2 is healthy
    let mut h = harness(FakeEngine::new(dead_then_alive), RelayConfig::default());
    h.launcher
        .push_session(test_session(2, NEW_CONTROL, NEW_HEALTH));
    let mut observer = h.events.subscribe();

    // WHEN: The monitor runs
    h.monitor
        .start(Some(test_session(1, OLD_CONTROL, OLD_HEALTH)))
        .await;

    // THEN: Connected -> Disconnected -> Restarting -> Connected (generation 2)
    assert_eq!(
        next_health_state(&mut observer).await,
        (HealthState::Connected, Some(1))
    );
    assert_eq!(
        next_health_state(&mut observer).await,
        (HealthState::Disconnected, Some(1))
    );
    assert_eq!(
        next_health_state(&mut observer).await,
        (HealthState::Restarting, Some(1))
    );
    assert_eq!(
        next_health_state(&mut observer).await,
        (HealthState::Connected, Some(2))
    );
    assert_eq!(h.launcher.restarts(), 1);

    // AND: The relay talks to the new generation
    assert_eq!(h.relay.session().map(|s| s.generation()), Some(2));
    let response = h.relay.send(EngineCommand::new("list_effects")).await;
    assert!(response.ok);
    assert_eq!(h.engine.connections_to(NEW_CONTROL), 1);

    // AND: Pings to the new generation report uptime
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let status = h.monitor.status();
    assert_eq!(status.state, HealthState::Connected);
    assert_eq!(status.uptime_s, Some(0.5));
    h.monitor.stop();
}

/// **VALUE**: Without a render in flight the restart happens exactly on the third miss.
///
/// **BUG THIS CATCHES**: Would catch an off-by-one in the miss limit.
#[tokio::test(start_paused = true)]
async fn given_failing_probes_when_not_rendering_then_restart_on_third_miss() {
    // GIVEN: Pings fail immediately
    let engine = FakeEngine::new(|port, _| match port {
        OLD_HEALTH => FakeReply::Fail,
        NEW_HEALTH => alive_reply(1.0),
        _ => ok_reply(),
    });
    let mut h = harness(engine, RelayConfig::default());
    h.launcher
        .push_session(test_session(2, NEW_CONTROL, NEW_HEALTH));

    // WHEN: Two then three intervals pass
    h.monitor
        .start(Some(test_session(1, OLD_CONTROL, OLD_HEALTH)))
        .await;
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    // THEN: Two misses, no restart yet
    assert_eq!(h.monitor.miss_count().await, 2);
    assert_eq!(h.launcher.restarts(), 0);
    assert_eq!(h.monitor.status().state, HealthState::Disconnected);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.launcher.restarts(), 1);
    assert_eq!(h.monitor.miss_count().await, 0);
    h.monitor.stop();
}

/// **VALUE**: While a heavy command is in flight the engine gets ten misses, not three.
///
/// **WHY THIS MATTERS**: A long render blocks the engine and every ping times out; restarting
/// it would throw away the render the user is waiting for.
///
/// **BUG THIS CATCHES**: Would catch the monitor ignoring render activity and restarting after
/// the third miss.
#[tokio::test(start_paused = true)]
async fn given_render_in_flight_when_probes_fail_then_restart_only_on_tenth_miss() {
    // GIVEN: A render that never returns and pings that fail
    let engine = FakeEngine::new(|port, request| match port {
        OLD_HEALTH => FakeReply::Fail,
        NEW_HEALTH => alive_reply(1.0),
        _ if request["cmd"] == "render_frame" => FakeReply::Hang,
        _ => ok_reply(),
    });
    let mut h = harness(
        engine,
        RelayConfig {
            command_timeout_ms: 120_000,
            export_poll_interval_ms: 500,
        },
    );
    h.launcher
        .push_session(test_session(2, NEW_CONTROL, NEW_HEALTH));

    let renderer = h.relay.clone();
    let render = tokio::spawn(async move { renderer.send(EngineCommand::new("render_frame")).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.relay.render_watch().is_rendering());

    // WHEN: Nine intervals pass
    h.monitor
        .start(Some(test_session(1, OLD_CONTROL, OLD_HEALTH)))
        .await;
    tokio::time::sleep(Duration::from_millis(9_500)).await;

    // THEN: Nine misses tolerated
    assert_eq!(h.monitor.miss_count().await, 9);
    assert_eq!(h.launcher.restarts(), 0);

    // WHEN: The tenth miss arrives
    tokio::time::sleep(Duration::from_secs(1)).await;

    // THEN: Restarted, and the old render no longer counts as in flight
    assert_eq!(h.launcher.restarts(), 1);
    assert!(!h.relay.render_watch().is_rendering());
    h.monitor.stop();
    render.abort();
}

/// **VALUE**: A successful ping after some misses resets the count.
///
/// **BUG THIS CATCHES**: Would catch misses accumulating across recoveries until an unrelated
/// hiccup restarts a healthy engine.
#[tokio::test(start_paused = true)]
async fn given_two_misses_when_probe_succeeds_then_connected_and_count_reset() {
    let pings = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pings);
    let engine = FakeEngine::new(move |port, _| {
        if port != OLD_HEALTH {
            return ok_reply();
        }
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            FakeReply::Fail
        } else {
            alive_reply(42.0)
        }
    });
    let mut h = harness(engine, RelayConfig::default());

    h.monitor
        .start(Some(test_session(1, OLD_CONTROL, OLD_HEALTH)))
        .await;
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    let status = h.monitor.status();
    assert_eq!(status.state, HealthState::Connected);
    assert_eq!(status.uptime_s, Some(42.0));
    assert_eq!(h.monitor.miss_count().await, 0);
    assert_eq!(h.launcher.restarts(), 0);
    h.monitor.stop();
}

/// **VALUE**: A failed respawn leaves the host disconnected and the relay unbound.
///
/// **WHY THIS MATTERS**: The UI must show that the engine is gone, and commands must fail
/// quickly instead of timing out against a dead port.
///
/// **BUG THIS CATCHES**: Would catch reporting Connected after a failed respawn, or leaving
/// the relay pointed at the dead generation.
#[tokio::test(start_paused = true)]
async fn given_respawn_fails_when_restarting_then_disconnected_and_relay_unbound() {
    // GIVEN: Dead pings and a launcher that fails
    let engine = FakeEngine::new(|port, _| match port {
        OLD_HEALTH => FakeReply::Fail,
        _ => ok_reply(),
    });
    let mut h = harness(engine, RelayConfig::default());
    h.launcher.push_failure("engine binary missing");
    let mut observer = h.events.subscribe();

    // WHEN: The miss limit is reached
    h.monitor
        .start(Some(test_session(1, OLD_CONTROL, OLD_HEALTH)))
        .await;
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    // THEN: Connected -> Disconnected -> Restarting -> Disconnected
    let mut states = Vec::new();
    while let Ok(event) = observer.try_recv() {
        if let HostEvent::Health(status) = event {
            states.push(status.state);
        }
    }
    assert_eq!(
        states,
        vec![
            HealthState::Connected,
            HealthState::Disconnected,
            HealthState::Restarting,
            HealthState::Disconnected,
        ]
    );
    assert!(!h.relay.is_connected());
    let response = h.relay.send(EngineCommand::new("list_effects")).await;
    assert_eq!(response.error.as_deref(), Some(ENGINE_NOT_CONNECTED));

    // AND: The next restart attempt only comes with the next full miss cycle
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.launcher.restarts(), 1);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.launcher.restarts(), 2);
    h.monitor.stop();
}

/// **VALUE**: The restart step remaps the frame ring of the new generation.
///
/// **WHY THIS MATTERS**: The new engine writes a fresh ring; a reader still mapped to the old
/// file shows a frozen frame forever.
///
/// **BUG THIS CATCHES**: Would catch restarting without reopening the frame feed.
#[tokio::test(start_paused = true)]
async fn given_restart_when_new_generation_has_ring_then_feed_is_remapped() {
    // GIVEN: The new generation announces a ring that already holds a frame
    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames-gen2"), 1024, 4);
    writer.write_frame(&jpeg_frame(2, 64));

    let mut h = harness(FakeEngine::new(dead_then_alive), RelayConfig::default());
    h.launcher.push_session(
        test_session(2, NEW_CONTROL, NEW_HEALTH).with_shm_path(writer.path()),
    );
    let mut observer = h.events.subscribe();
    assert!(!h.frames.is_open());

    // WHEN: The old generation dies and is restarted
    h.monitor
        .start(Some(test_session(1, OLD_CONTROL, OLD_HEALTH)))
        .await;
    while next_health_state(&mut observer).await != (HealthState::Connected, Some(2)) {}

    // THEN: The feed reads the new ring
    assert_eq!(h.frames.path().as_deref(), Some(writer.path()));
    assert_eq!(h.frames.read_latest().unwrap().bytes, jpeg_frame(2, 64));
    h.monitor.stop();
}

/// **VALUE**: The frame reader is unmapped before the old sidecar is killed.
///
/// **WHY THIS MATTERS**: The new generation may truncate or recreate the ring file at the same
/// path. A mapping that survives into the respawn faults the whole host with SIGBUS on the
/// next frame read.
///
/// **BUG THIS CATCHES**: Would catch closing the feed only after the launcher returns, or only
/// when the restart fails.
#[tokio::test(start_paused = true)]
async fn given_open_ring_when_restarting_then_feed_closed_before_launcher_runs() {
    // GIVEN: The old generation's ring is mapped and the new one announces its own path
    let dir = TempDir::new().unwrap();
    let mut old_ring = RingWriter::create(&dir.path().join("frames-gen1"), 1024, 4);
    old_ring.write_frame(&jpeg_frame(1, 64));
    let mut new_ring = RingWriter::create(&dir.path().join("frames-gen2"), 1024, 4);
    new_ring.write_frame(&jpeg_frame(2, 64));

    let mut h = harness(FakeEngine::new(dead_then_alive), RelayConfig::default());
    h.frames.open(old_ring.path()).unwrap();
    assert!(h.frames.is_open());
    h.launcher.watch_feed(h.frames.clone());
    h.launcher.push_session(
        test_session(2, NEW_CONTROL, NEW_HEALTH).with_shm_path(new_ring.path()),
    );
    let mut observer = h.events.subscribe();

    // WHEN: The old generation dies and is restarted
    h.monitor
        .start(Some(test_session(1, OLD_CONTROL, OLD_HEALTH)))
        .await;
    while next_health_state(&mut observer).await != (HealthState::Connected, Some(2)) {}

    // THEN: The launcher ran with no mapping held
    assert_eq!(h.launcher.feed_open_at_restart(), vec![false]);

    // AND: The feed is reopened on the new ring afterwards
    assert_eq!(h.frames.path().as_deref(), Some(new_ring.path()));
    assert_eq!(h.frames.read_latest().unwrap().bytes, jpeg_frame(2, 64));
    h.monitor.stop();
}

// ============================================================================
// Cancellation
// ============================================================================

/// **VALUE**: Stopping the monitor discards the result of a probe already in flight and
/// cancels every later probe.
///
/// **BUG THIS CATCHES**: Would catch a stopped monitor still counting a miss (or restarting the
/// engine during app shutdown) because a late probe result came back.
#[tokio::test(start_paused = true)]
async fn given_probe_in_flight_when_stopped_then_result_discarded_and_no_more_probes() {
    // GIVEN: Pings that fail after 500 ms
    let engine = FakeEngine::new(|port, _| match port {
        OLD_HEALTH => FakeReply::Delayed(
            Duration::from_millis(500),
            json!({"ok": false, "error": "invalid token"}),
        ),
        _ => ok_reply(),
    });
    let mut h = harness(engine, RelayConfig::default());
    h.monitor
        .start(Some(test_session(1, OLD_CONTROL, OLD_HEALTH)))
        .await;

    // WHEN: Stopping while the first ping is in flight
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(h.engine.count_cmd("ping"), 1);
    h.monitor.stop();
    tokio::time::sleep(Duration::from_secs(5)).await;

    // THEN: Still connected, no miss counted, no further pings
    assert_eq!(h.monitor.status().state, HealthState::Connected);
    assert_eq!(h.monitor.miss_count().await, 0);
    assert_eq!(h.engine.count_cmd("ping"), 1);
    assert!(!h.monitor.is_running());
}

/// **VALUE**: Starting without a session begins disconnected and restarts after the miss limit.
#[tokio::test(start_paused = true)]
async fn given_no_initial_session_when_started_then_disconnected_until_restart() {
    let mut h = harness(FakeEngine::new(dead_then_alive), RelayConfig::default());
    h.relay.disconnect();
    h.launcher
        .push_session(test_session(2, NEW_CONTROL, NEW_HEALTH));

    h.monitor.start(None).await;
    assert_eq!(h.monitor.status().state, HealthState::Disconnected);

    tokio::time::sleep(Duration::from_millis(3_500)).await;

    assert_eq!(h.launcher.restarts(), 1);
    assert_eq!(h.monitor.status().state, HealthState::Connected);
    assert!(h.relay.is_connected());
    h.monitor.stop();
}
