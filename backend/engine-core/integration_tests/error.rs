use engine_core::error::CoreError;
use engine_core::error::config::ConfigError;
use engine_core::error::frame_ring::FrameRingError;
use engine_core::error::spawn::SpawnError;
use engine_core::error::transport::TransportError;
use engine_core::frame_ring::FrameRingReader;

use common::ErrorLocation;

use std::error::Error;
use std::io::{Error as IoError, ErrorKind};
use std::panic::Location;
use std::path::PathBuf;
use std::time::Duration;

/// **VALUE**: Verifies that transport constructors record the caller's location.
///
/// **WHY THIS MATTERS**: A failed command only surfaces as "io: ..." in the UI; the log
/// line must point at the exact call that produced it (connect, send, or receive).
///
/// **BUG THIS CATCHES**: Would catch a constructor losing `#[track_caller]`, which makes
/// every transport error point into the error module itself.
#[test]
fn given_transport_constructor_when_formatted_then_location_is_caller() {
    // GIVEN: Errors built from this file
    let errors = [
        TransportError::timeout("render_frame", Duration::from_secs(30)),
        TransportError::io("connection reset"),
        TransportError::protocol("response id mismatch"),
        TransportError::busy("request in flight"),
        TransportError::not_connected("no session"),
    ];

    // WHEN / THEN: Each points here, not at src/error/transport.rs
    for err in &errors {
        let text = err.to_string();
        assert!(text.contains("error.rs"), "missing location: {text}");
        assert!(!text.contains("src/error/transport.rs"), "wrong location: {text}");
    }
}

/// **VALUE**: Verifies the short categories used in failed command responses.
///
/// **BUG THIS CATCHES**: Would catch a renamed category breaking the UI's error mapping.
#[test]
fn given_transport_errors_when_categorised_then_stable_names() {
    assert_eq!(
        TransportError::timeout("x", Duration::from_millis(1)).error_category(),
        "timeout"
    );
    assert_eq!(TransportError::io("x").error_category(), "io");
    assert_eq!(TransportError::protocol("x").error_category(), "protocol");
    assert_eq!(TransportError::busy("x").error_category(), "busy");
    assert_eq!(
        TransportError::not_connected("x").error_category(),
        "not_connected"
    );
    assert!(TransportError::timeout("x", Duration::from_millis(1)).is_timeout());
    assert!(!TransportError::io("x").is_timeout());
}

/// **VALUE**: Verifies that a timeout message names the operation and the limit.
#[test]
fn given_timeout_error_when_formatted_then_includes_duration() {
    let err = TransportError::timeout("export_status", Duration::from_millis(1500));

    let text = err.to_string();

    assert!(text.starts_with("Timeout Error: export_status after 1.5s"));
}

/// **VALUE**: Verifies that invalid JSON converts into a protocol error.
#[test]
fn given_invalid_json_when_converted_then_protocol_error() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();

    let err = TransportError::from(json_err);

    assert!(matches!(err, TransportError::Protocol { .. }));
    assert!(err.to_string().contains("invalid JSON"));
}

/// **VALUE**: Verifies that `SpawnError::Spawn` keeps the I/O error as its source.
///
/// **WHY THIS MATTERS**: "No such file or directory" from the OS is what tells the user the
/// engine binary is missing; dropping the source hides it.
#[test]
fn given_spawn_error_when_source_requested_then_io_error_returned() {
    // GIVEN: A spawn error wrapping NotFound
    let err = SpawnError::spawn(
        "Failed to spawn entropic-engine",
        IoError::new(ErrorKind::NotFound, "binary not found"),
    );

    // WHEN: Walking the source chain
    let source = err.source().expect("spawn error should have a source");

    // THEN: The original message survives
    assert_eq!(source.to_string(), "binary not found");
    assert!(err.to_string().starts_with("Spawn Error: Failed to spawn"));
}

/// **VALUE**: Verifies each spawn failure kind formats with its own prefix and location.
#[test]
fn given_spawn_errors_when_formatted_then_prefix_and_location() {
    let cases = [
        (SpawnError::parse("bad port"), "Parse Error: bad port"),
        (SpawnError::timeout("no announcement"), "Timeout Error: no announcement"),
        (SpawnError::exited("exit code 1"), "Exited Error: exit code 1"),
        (SpawnError::validation("empty program"), "Validation Error: empty program"),
    ];

    for (err, prefix) in cases {
        let text = err.to_string();
        assert!(text.starts_with(prefix), "unexpected text: {text}");
        assert!(text.contains("error.rs"), "missing location: {text}");
    }
}

/// **VALUE**: Verifies that opening a missing ring reports the path and the I/O source.
///
/// **BUG THIS CATCHES**: Would catch the open path returning an error without the file name,
/// which leaves nothing to compare against the announced `ZMQ_SHM_PATH`.
#[test]
fn given_missing_ring_file_when_opened_then_open_error_with_path_and_source() {
    // GIVEN: A path that does not exist
    let path = PathBuf::from("/nonexistent/entropic/frames");

    // WHEN: Opening it
    let err = match FrameRingReader::open(&path) {
        Err(err) => err,
        Ok(_) => panic!("opening a missing file should fail"),
    };

    // THEN: Open error naming the path, with the OS error attached
    let text = err.to_string();
    assert!(text.starts_with("Open Error: /nonexistent/entropic/frames"));
    assert!(matches!(err, FrameRingError::Open { source: Some(_), .. }));
    assert!(err.source().is_some());
}

/// **VALUE**: Verifies that frame ring errors without a path still carry a location.
#[test]
#[track_caller]
fn given_corrupt_slot_error_when_formatted_then_includes_location() {
    let err = FrameRingError::CorruptSlot {
        message: "slot 3 length 9000 does not fit slot size 4096".to_string(),
        location: ErrorLocation::from(Location::caller()),
    };

    let text = err.to_string();

    assert!(text.contains("Corrupt Slot Error"));
    assert!(text.contains("slot 3"));
    assert!(text.contains("error.rs"));
}

/// **VALUE**: Verifies that `CoreError` wraps each domain error transparently.
///
/// **WHY THIS MATTERS**: The host logs `CoreError`; a wrapper that adds its own prefix would
/// double up the "X Error:" text and hide the location at the end.
#[test]
fn given_domain_errors_when_wrapped_then_display_unchanged() {
    let transport = TransportError::io("reset");
    let expected = transport.to_string();
    let wrapped: CoreError = transport.into();
    assert_eq!(wrapped.to_string(), expected);

    let config = ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: "max_misses must be at least 1".to_string(),
    };
    let expected = config.to_string();
    let wrapped: CoreError = config.into();
    assert_eq!(wrapped.to_string(), expected);
    assert!(matches!(wrapped, CoreError::Config(_)));

    let wrapped: CoreError = SpawnError::exited("gone").into();
    assert!(matches!(wrapped, CoreError::Spawn(SpawnError::Exited { .. })));

    let wrapped: CoreError = FrameRingError::closed("/tmp/frames").into();
    assert!(matches!(wrapped, CoreError::FrameRing(FrameRingError::Closed { .. })));
}
