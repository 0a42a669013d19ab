// Unit tests for logger initialization
// The global logger can be installed once per process, so both scenarios share
// one test to keep the order deterministic.

use crate::error::HostError;
use crate::logger::{LOG_FILE_NAME, initialize};

use std::path::PathBuf;

use tempfile::TempDir;

/// **VALUE**: Verifies that a bad directory is an error, and that repeated calls after a
/// successful install are harmless.
///
/// **WHY THIS MATTERS**: The platform data dir can be missing or read-only; startup must
/// report that instead of panicking. Once installed, a second call (from tests or a
/// restart path) must not try to replace the global logger.
///
/// **BUG THIS CATCHES**: Would catch `fern::log_file()` being unwrapped, or the `Once` /
/// `AtomicBool` guards being removed so fern panics on a second `apply()`.
#[test]
fn given_logger_when_initialized_repeatedly_then_idempotent_and_errors_reported() {
    // GIVEN: A directory that cannot hold a log file
    let invalid_dir = PathBuf::from("/dev/null/invalid-path");

    // WHEN: Initializing with it
    let result = initialize(&invalid_dir);

    // THEN: A Logger error, not a panic
    assert!(
        matches!(result, Err(HostError::Logger { .. })),
        "expected logger error, got {result:?}"
    );

    // GIVEN: A valid directory
    let temp_dir = TempDir::new().unwrap();

    // WHEN: Initializing twice more
    let first = initialize(temp_dir.path());
    let second = initialize(temp_dir.path());

    // THEN: Both return Ok; the guard already tripped so no file is opened
    assert!(first.is_ok(), "later initialization should be a no-op");
    assert!(second.is_ok(), "later initialization should be a no-op");
    assert!(!temp_dir.path().join(LOG_FILE_NAME).exists());
}
