use crate::relay::RenderTracker;

/// **VALUE**: Verifies the watch reports rendering exactly while a guard is alive.
///
/// **WHY THIS MATTERS**: The health monitor picks its miss limit from this flag; a flag stuck
/// on disables crash detection, a flag stuck off restarts the engine mid-render.
///
/// **BUG THIS CATCHES**: Would catch the guard not clearing the flag on drop.
#[test]
fn given_guard_when_dropped_then_rendering_ends() {
    // GIVEN: A tracker and a watch on it
    let tracker = RenderTracker::new();
    let watch = tracker.watch();
    assert!(!watch.is_rendering());

    // WHEN: A heavy command is in flight
    let guard = tracker.begin("render_frame");

    // THEN: Rendering until the guard drops
    assert!(watch.is_rendering());
    drop(guard);
    assert!(!watch.is_rendering());
}

/// **VALUE**: Verifies overlapping heavy commands keep the flag set until the last ends.
///
/// **BUG THIS CATCHES**: Would catch a boolean flag that the first finishing command clears
/// while a second is still running.
#[test]
fn given_two_guards_when_one_dropped_then_still_rendering() {
    let tracker = RenderTracker::new();
    let watch = tracker.watch();

    let first = tracker.begin("apply_chain");
    let second = tracker.begin("export_start");
    drop(first);

    assert!(watch.is_rendering());
    assert_eq!(tracker.in_flight(), 1);
    drop(second);
    assert!(!watch.is_rendering());
}

/// **VALUE**: Verifies a guard from before a reset does not disturb the new generation.
///
/// **WHY THIS MATTERS**: A restart resets render activity while a command against the dead
/// engine may still be unwinding; when it finishes it must not decrement a render started
/// against the new engine.
///
/// **BUG THIS CATCHES**: Would catch a plain counter where the stale guard's drop clears the
/// new render's flag.
#[test]
fn given_guard_from_before_reset_when_dropped_then_new_render_still_counted() {
    // GIVEN: A render in flight, then a reset (engine restarted)
    let tracker = RenderTracker::new();
    let watch = tracker.watch();
    let stale = tracker.begin("render_frame");
    tracker.reset();
    assert!(!watch.is_rendering());

    // WHEN: A new render starts and the stale guard drops
    let fresh = tracker.begin("render_frame");
    drop(stale);

    // THEN: The new render is still tracked
    assert!(watch.is_rendering());
    drop(fresh);
    assert!(!watch.is_rendering());
}
