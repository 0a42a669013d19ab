// Unit tests for the startup announcement parser
// End-to-end spawn tests with fake sidecars are in integration_tests/supervisor.rs

use crate::error::spawn::SpawnError;
use crate::supervisor::announcement::{
    AnnouncementParser, CONTROL_PORT_KEY, HEALTH_PORT_KEY, TOKEN_KEY, get_announcement_regex,
};

use std::path::PathBuf;

/// **VALUE**: Verifies that an announcement spread over several lines is assembled.
///
/// **WHY THIS MATTERS**: The engine prints its ports as it binds each socket, so the keys
/// usually arrive on separate lines interleaved with log output.
///
/// **BUG THIS CATCHES**: Would catch a parser that expects every key on a single line, or
/// that resets state between lines.
#[test]
fn given_keys_on_separate_lines_when_fed_then_announcement_is_complete() {
    // GIVEN: A parser
    let mut parser = AnnouncementParser::new();

    // WHEN: Feeding typical engine output
    parser.feed("Loading effects registry...").unwrap();
    parser.feed("ZMQ_PORT=5555").unwrap();
    assert!(!parser.is_complete());
    parser.feed("ZMQ_PING_PORT=5556").unwrap();
    parser.feed("ZMQ_TOKEN=3f2a9c").unwrap();

    // THEN: All three required values are captured
    assert!(parser.is_complete());
    let announcement = parser.finish().expect("announcement should be complete");
    assert_eq!(announcement.control_port, 5555);
    assert_eq!(announcement.health_port, 5556);
    assert_eq!(announcement.token.as_str(), "3f2a9c");
    assert_eq!(announcement.shm_path, None);
}

/// **VALUE**: Verifies several keys on one line are all captured.
///
/// **BUG THIS CATCHES**: Would catch using `captures()` instead of `captures_iter()`, which
/// silently drops every key after the first on a line.
#[test]
fn given_all_keys_on_one_line_when_fed_then_every_key_is_captured() {
    let mut parser = AnnouncementParser::new();

    parser
        .feed("ZMQ_PORT=4000 ZMQ_PING_PORT=4001 ZMQ_TOKEN=abc ZMQ_SHM_PATH=/tmp/frames")
        .unwrap();

    let announcement = parser.finish().expect("announcement should be complete");
    assert_eq!(announcement.control_port, 4000);
    assert_eq!(announcement.health_port, 4001);
    assert_eq!(announcement.shm_path, Some(PathBuf::from("/tmp/frames")));
}

/// **VALUE**: Verifies that a garbage port is a parse error rather than a silent skip.
///
/// **WHY THIS MATTERS**: An engine that announces a broken port will never be reachable;
/// failing fast beats waiting out the full startup timeout.
///
/// **BUG THIS CATCHES**: Would catch ignoring the parse failure and timing out 15 s later
/// with a misleading "did not announce" error.
#[test]
fn given_non_numeric_port_when_fed_then_returns_parse_error() {
    let mut parser = AnnouncementParser::new();

    let result = parser.feed("ZMQ_PORT=notaport");

    assert!(matches!(result, Err(SpawnError::Parse { .. })));
}

/// **VALUE**: Verifies port 0 is rejected.
///
/// **BUG THIS CATCHES**: Would catch accepting the "pick any port" placeholder as the real port.
#[test]
fn given_port_zero_when_fed_then_returns_parse_error() {
    let mut parser = AnnouncementParser::new();

    let result = parser.feed("ZMQ_PING_PORT=0");

    assert!(matches!(result, Err(SpawnError::Parse { .. })));
}

/// **VALUE**: Verifies the missing-key report used in startup error messages.
#[test]
fn given_partial_announcement_when_missing_keys_requested_then_lists_remaining_keys() {
    let mut parser = AnnouncementParser::new();
    parser.feed("ZMQ_PORT=5555").unwrap();

    assert_eq!(parser.missing_keys(), vec![HEALTH_PORT_KEY, TOKEN_KEY]);
    assert!(parser.finish().is_none());
}

/// **VALUE**: Verifies unrelated `KEY=value` output is ignored.
///
/// **BUG THIS CATCHES**: Would catch a parser that errors out on the engine's own log lines,
/// e.g. `PYTHONPATH=...` echoed at startup.
#[test]
fn given_unknown_keys_when_fed_then_ignored() {
    let mut parser = AnnouncementParser::new();

    parser.feed("PYTHONPATH=/opt/engine LOG_LEVEL=debug").unwrap();

    assert_eq!(parser.missing_keys().len(), 3);
}

/// **VALUE**: Verifies the regex only matches whole `KEY=value` tokens.
///
/// **BUG THIS CATCHES**: Would catch matching a key embedded in another word, e.g.
/// `XZMQ_PORT=1` being read as `ZMQ_PORT`.
#[test]
fn given_key_inside_word_when_regex_applied_then_does_not_match_suffix() {
    let re = get_announcement_regex();

    let keys: Vec<_> = re
        .captures_iter("xZMQ_PORT=1 lower=2 ZMQ_PORT=3")
        .filter_map(|cap| cap.name("key").map(|m| m.as_str().to_string()))
        .collect();

    assert_eq!(keys, vec![CONTROL_PORT_KEY.to_string()]);
}

/// **VALUE**: Verifies the token never leaks through Debug formatting of the announcement.
///
/// **WHY THIS MATTERS**: Announcements are logged at startup; logs get attached to bug reports.
#[test]
fn given_announcement_when_debug_formatted_then_token_is_redacted() {
    let mut parser = AnnouncementParser::new();
    parser
        .feed("ZMQ_PORT=1 ZMQ_PING_PORT=2 ZMQ_TOKEN=supersecret")
        .unwrap();

    let announcement = parser.finish().unwrap();
    let debug = format!("{announcement:?}");

    assert!(!debug.contains("supersecret"));
    assert!(debug.contains("REDACTED"));
}

/// **VALUE**: Verifies the `ENGINE_` spellings of the keys are accepted alongside `ZMQ_`.
///
/// **WHY THIS MATTERS**: Engine builds that print the alternative spelling must still be
/// reachable; otherwise startup times out even though every port was announced.
///
/// **BUG THIS CATCHES**: Would catch dropping the alias arms from the key match.
#[test]
fn given_engine_prefixed_keys_when_fed_then_announcement_is_complete() {
    // GIVEN: A parser
    let mut parser = AnnouncementParser::new();

    // WHEN: The engine uses the ENGINE_ spelling
    parser
        .feed("ENGINE_PORT=6000 ENGINE_PING_PORT=6001 ENGINE_TOKEN=tok ENGINE_SHM_PATH=/tmp/ring")
        .unwrap();

    // THEN: The announcement is as complete as with ZMQ_ keys
    let announcement = parser.finish().expect("announcement should be complete");
    assert_eq!(announcement.control_port, 6000);
    assert_eq!(announcement.health_port, 6001);
    assert_eq!(announcement.token.as_str(), "tok");
    assert_eq!(announcement.shm_path, Some(PathBuf::from("/tmp/ring")));
}
