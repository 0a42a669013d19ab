use crate::RedactedToken;

/// **VALUE**: Verifies that Debug and Display never print the token value.
///
/// **WHY THIS MATTERS**: The session descriptor is logged on every restart. A token
/// in the log file lets any local process talk to the sidecar.
///
/// **BUG THIS CATCHES**: Would catch a derived Debug sneaking back in.
#[test]
fn given_token_when_formatted_then_value_is_redacted() {
    // GIVEN: A token with a recognisable value
    let token = RedactedToken::new("4f1c-secret-value");

    // WHEN: Formatting with Debug and Display
    let debug = format!("{token:?}");
    let display = format!("{token}");

    // THEN: Neither contains the value
    assert!(!debug.contains("secret"));
    assert!(!display.contains("secret"));
    assert!(debug.contains("len=17"));
}

/// **VALUE**: Verifies that serializing the wrapper fails.
///
/// **WHY THIS MATTERS**: Request envelopes must stamp the token explicitly via
/// `as_str()`. Accidentally serializing the wrapper into an event would leak it.
///
/// **BUG THIS CATCHES**: Would catch a derived `Serialize`.
#[test]
fn given_token_when_serialized_then_returns_error() {
    // GIVEN: A token
    let token = RedactedToken::new("abc");

    // WHEN: Serializing it
    let result = serde_json::to_string(&token);

    // THEN: Serialization is refused
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("cannot be serialized"));
}

/// **VALUE**: Verifies the raw accessor and equality used for stale-token checks.
#[test]
fn given_two_tokens_when_compared_then_equality_follows_value() {
    let a = RedactedToken::new("one");
    let b = RedactedToken::new("one");
    let c = RedactedToken::new("two");

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.as_str(), "one");
    assert_eq!(a.len(), 3);
    assert!(!a.is_empty());
}
