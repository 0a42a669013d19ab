use crate::error::transport::TransportError;
use crate::protocol::{
    EXPORT_START, EngineCommand, EngineResponse, PING, PingReply, RENDER_FRAME, decode_response,
    encode_request,
};

use common::RedactedToken;

use serde_json::{Map, Value, json};

/// **VALUE**: Verifies requests are flat JSON objects with cmd, id, token and fields.
///
/// **WHY THIS MATTERS**: The engine rejects any message without a matching `_token` and
/// routes on `cmd`; a nested or renamed envelope is rejected wholesale.
///
/// **BUG THIS CATCHES**: Would catch serializing the fields under a nested key, or renaming
/// `_token` to `token`.
#[test]
fn given_command_with_fields_when_encoded_then_envelope_is_flat() {
    // GIVEN: A seek command with a time field
    let command = EngineCommand::new("seek").with_field("time", 1.5);
    let token = RedactedToken::new("tok");

    // WHEN: Encoding
    let raw = encode_request(&command, "req-1", &token).unwrap();

    // THEN: All keys at the top level
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        value,
        json!({"cmd": "seek", "id": "req-1", "_token": "tok", "time": 1.5})
    );
}

/// **VALUE**: Verifies a UI payload cannot override the envelope.
///
/// **WHY THIS MATTERS**: Fields come from the UI; letting them set `_token` or `id` would
/// break auth and response correlation.
///
/// **BUG THIS CATCHES**: Would catch inserting user fields after the envelope keys.
#[test]
fn given_fields_with_envelope_keys_when_encoded_then_envelope_wins() {
    let mut fields = Map::new();
    fields.insert("_token".into(), json!("forged"));
    fields.insert("id".into(), json!("forged"));
    fields.insert("path".into(), json!("/videos/a.mp4"));
    let command = EngineCommand::with_fields("ingest", fields);

    let raw = encode_request(&command, "req-2", &RedactedToken::new("real")).unwrap();

    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["_token"], "real");
    assert_eq!(value["id"], "req-2");
    assert_eq!(value["path"], "/videos/a.mp4");
}

/// **VALUE**: Verifies which commands count as heavy.
///
/// **BUG THIS CATCHES**: Would catch a rename that drops `render_frame` from the heavy set,
/// silently reintroducing false restarts during renders.
#[test]
fn given_commands_when_checked_then_only_heavy_ones_are_heavy() {
    assert!(EngineCommand::new(RENDER_FRAME).is_heavy());
    assert!(EngineCommand::new(EXPORT_START).is_heavy());
    assert!(EngineCommand::new("apply_chain").is_heavy());
    assert!(EngineCommand::new("seek").is_heavy());
    assert!(!EngineCommand::new("list_effects").is_heavy());
    assert!(!EngineCommand::new(PING).is_heavy());
}

/// **VALUE**: Verifies a reply to another request is a protocol error.
///
/// **WHY THIS MATTERS**: After a timeout, a late reply to the previous request could be
/// mistaken for the answer to the current one.
///
/// **BUG THIS CATCHES**: Would catch skipping id correlation altogether.
#[test]
fn given_reply_with_other_id_when_decoded_then_returns_protocol_error() {
    let result = decode_response(r#"{"id":"other","ok":true}"#, "mine");

    assert!(matches!(result, Err(TransportError::Protocol { .. })));
}

/// **VALUE**: Verifies a reply without an id is accepted.
///
/// **WHY THIS MATTERS**: The engine answers undecodable requests with an error that has no id.
#[test]
fn given_reply_without_id_when_decoded_then_accepted() {
    let response = decode_response(r#"{"ok":false,"error":"invalid JSON"}"#, "mine").unwrap();

    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some("invalid JSON"));
}

/// **VALUE**: Verifies extra reply fields are preserved for the UI.
#[test]
fn given_reply_with_extra_fields_when_decoded_then_fields_are_kept() {
    let response = decode_response(
        r#"{"id":"a","ok":true,"effects":["blur"],"count":1}"#,
        "a",
    )
    .unwrap();

    assert!(response.ok);
    assert_eq!(response.field("effects"), Some(&json!(["blur"])));
    assert_eq!(response.field("count"), Some(&json!(1)));
}

/// **VALUE**: Verifies malformed JSON maps to a protocol error, not a panic.
#[test]
fn given_malformed_json_when_decoded_then_returns_protocol_error() {
    let result = decode_response("{not json", "a");

    assert!(matches!(result, Err(TransportError::Protocol { .. })));
}

/// **VALUE**: Verifies an alive ping reply with uptime is understood.
#[test]
fn given_alive_ping_reply_when_parsed_then_uptime_is_reported() {
    let response = decode_response(
        r#"{"id":"p","status":"alive","uptime_s":12.5,"last_frame_ms":3.2}"#,
        "p",
    )
    .unwrap();

    let reply = PingReply::from_response(&response).unwrap();

    assert_eq!(reply.uptime_s, Some(12.5));
    assert_eq!(reply.last_frame_ms, Some(3.2));
}

/// **VALUE**: Verifies a ping rejected by the engine counts as a failure.
///
/// **BUG THIS CATCHES**: Would catch treating any reply (including an auth error after a
/// token mismatch) as proof of life.
#[test]
fn given_error_ping_reply_when_parsed_then_returns_protocol_error() {
    let response = EngineResponse::failure(Some("p".into()), "invalid token");

    let result = PingReply::from_response(&response);

    assert!(matches!(result, Err(TransportError::Protocol { .. })));
}

/// **VALUE**: Verifies failure responses serialize with `ok: false` and the error text.
#[test]
fn given_failure_response_when_serialized_then_has_ok_false_and_error() {
    let response = EngineResponse::failure(Some("x".into()), "engine not connected");

    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(
        value,
        json!({"id": "x", "ok": false, "error": "engine not connected"})
    );
}
