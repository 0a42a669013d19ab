use crate::ErrorLocation;

use std::panic::Location;

/// **VALUE**: Verifies that `ErrorLocation` renders as `[file:line:column]`.
///
/// **WHY THIS MATTERS**: Every error in the workspace appends its location to the
/// Display output. Log readers rely on the bracketed format to jump to the source.
///
/// **BUG THIS CATCHES**: Would catch a change to the Display format that drops the
/// column or the brackets.
#[test]
#[track_caller]
fn given_caller_location_when_displayed_then_formats_file_line_column() {
    // GIVEN: A location captured from this test
    let location = ErrorLocation::from(Location::caller());

    // WHEN: Formatting it
    let rendered = location.to_string();

    // THEN: It contains the file and is bracketed
    assert!(rendered.starts_with('['));
    assert!(rendered.ends_with(']'));
    assert!(rendered.contains("error_location.rs"));
    assert_eq!(
        rendered,
        format!("[{}:{}:{}]", location.file, location.line, location.column)
    );
}

/// **VALUE**: Verifies that `ErrorLocation` serializes its fields.
///
/// **WHY THIS MATTERS**: Host errors are serialized when they cross to the UI layer;
/// the location must survive that trip.
///
/// **BUG THIS CATCHES**: Would catch removal of `#[derive(Serialize)]`.
#[test]
fn given_error_location_when_serialized_then_contains_fields() {
    // GIVEN: A fixed location
    let location = ErrorLocation {
        file: "relay.rs",
        line: 12,
        column: 7,
    };

    // WHEN: Serializing to JSON
    let json = serde_json::to_string(&location).unwrap();

    // THEN: All three fields are present
    assert_eq!(json, r#"{"file":"relay.rs","line":12,"column":7}"#);
}
