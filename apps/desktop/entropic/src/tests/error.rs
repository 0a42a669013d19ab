// Unit tests for the host error type
// Serialization matters because errors are meant to cross a UI bridge

use crate::error::HostError;

use common::ErrorLocation;

use std::panic::Location;

/// **VALUE**: Tests that host errors serialize with a type tag and their data.
///
/// **WHY THIS MATTERS**: A UI bridge forwards errors as JSON. If serialization breaks,
/// the frontend receives opaque failures and cannot tell a missing engine from a bad config.
///
/// **BUG THIS CATCHES**: Would catch removing `#[derive(Serialize)]`, changing the tag
/// layout, or adding a non-serializable field.
#[test]
fn given_host_error_when_serialized_then_tagged_with_variant() {
    // GIVEN: A Core error
    let err = HostError::Core {
        message: String::from("sidecar.program cannot be empty"),
        location: ErrorLocation::from(Location::caller()),
    };

    // WHEN: Serializing to JSON
    let json = serde_json::to_value(&err).expect("Error should be serializable");

    // THEN: Tagged with the variant, carrying message and location
    assert_eq!(json["type"], "Core");
    assert_eq!(json["data"]["message"], "sidecar.program cannot be empty");
    assert!(
        json["data"]["location"]["file"]
            .as_str()
            .is_some_and(|file| file.ends_with("error.rs")),
        "location should point at this file: {json}"
    );
}

/// **VALUE**: Tests that Display names the error kind and appends the location.
///
/// **BUG THIS CATCHES**: Would catch a variant losing its `{location}` in the format string.
#[test]
fn given_each_variant_when_formatted_then_prefix_and_location() {
    let location = ErrorLocation::from(Location::caller());
    let cases = [
        (
            HostError::Host {
                message: "no data dir".into(),
                location,
            },
            "Host Error: no data dir",
        ),
        (
            HostError::Core {
                message: "bad config".into(),
                location,
            },
            "Core Error: bad config",
        ),
        (
            HostError::Logger {
                message: "already set".into(),
                location,
            },
            "Logger Error: already set",
        ),
    ];

    for (err, prefix) in cases {
        let text = err.to_string();
        assert!(text.starts_with(prefix), "unexpected text: {text}");
        assert!(text.ends_with(&location.to_string()), "missing location: {text}");
    }
}
