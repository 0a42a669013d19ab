use crate::health::MissCounter;

/// **VALUE**: Verifies the restart signal fires exactly on the third consecutive miss.
///
/// **WHY THIS MATTERS**: Restarting too early kills a healthy engine on a hiccup; too late
/// leaves the user staring at a frozen preview.
///
/// **BUG THIS CATCHES**: Would catch `>` vs `>=` mistakes that restart on the 2nd or 4th miss.
#[test]
fn given_limit_three_when_missed_three_times_then_third_miss_signals() {
    // GIVEN: A counter with a limit of 3
    let mut counter = MissCounter::new(3);

    // WHEN/THEN: miss, miss, miss -> false, false, true
    assert!(!counter.miss());
    assert!(!counter.miss());
    assert!(counter.miss());
    assert_eq!(counter.count(), 3);
}

/// **VALUE**: Verifies a successful probe resets the count.
///
/// **WHY THIS MATTERS**: Only consecutive misses indicate a crash; scattered timeouts
/// under load must never add up to a restart.
///
/// **BUG THIS CATCHES**: Would catch `hit()` decrementing instead of resetting.
#[test]
fn given_two_misses_when_hit_then_next_miss_starts_from_one() {
    // GIVEN: Two misses recorded
    let mut counter = MissCounter::new(3);
    counter.miss();
    counter.miss();

    // WHEN: A probe succeeds
    counter.hit();

    // THEN: Count is back to 0 and the next miss does not signal
    assert_eq!(counter.count(), 0);
    assert!(!counter.miss());
    assert!(!counter.miss());
    assert!(counter.miss());
}

/// **VALUE**: Verifies the elevated limit used while rendering.
///
/// **WHY THIS MATTERS**: A heavy render blocks the engine's event loop for seconds; probes
/// time out even though nothing crashed.
///
/// **BUG THIS CATCHES**: Would catch the render limit being ignored so a long render triggers
/// a restart after 3 misses.
#[test]
fn given_render_limit_ten_when_missed_then_signals_only_on_tenth() {
    let mut counter = MissCounter::new(3);

    for miss in 1..10 {
        assert!(!counter.miss_with_limit(10), "signalled early at miss {miss}");
    }
    assert!(counter.miss_with_limit(10));
}

/// **VALUE**: Verifies that misses counted under the render limit still count once the
/// render ends.
///
/// **BUG THIS CATCHES**: Would catch keeping separate counters per limit, which would let an
/// engine that died mid-render go unnoticed for another full normal limit.
#[test]
fn given_misses_during_render_when_render_ends_then_normal_limit_applies_immediately() {
    let mut counter = MissCounter::new(3);
    for _ in 0..4 {
        counter.miss_with_limit(10);
    }

    assert!(counter.miss(), "5 misses already exceed the normal limit of 3");
}

/// **VALUE**: Verifies a zero limit is clamped instead of signalling on every call or never.
#[test]
fn given_zero_limit_when_constructed_then_behaves_as_one() {
    let mut counter = MissCounter::new(0);

    assert_eq!(counter.max_misses(), 1);
    assert!(counter.miss());
}

/// **VALUE**: Verifies `reset()` clears the count.
#[test]
fn given_misses_when_reset_then_count_is_zero() {
    let mut counter = MissCounter::new(3);
    counter.miss();
    counter.miss();

    counter.reset();

    assert_eq!(counter.count(), 0);
}
