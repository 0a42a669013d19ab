use crate::protocol::EngineResponse;
use crate::relay::{ExportProgress, ExportStatus};

use serde_json::{Map, Value, json};

fn status_response(fields: Value) -> EngineResponse {
    let fields: Map<String, Value> = match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    EngineResponse {
        id: Some("poll".into()),
        ok: true,
        error: None,
        fields,
    }
}

/// **VALUE**: Verifies a running export keeps polling and reports its progress.
#[test]
fn given_running_status_when_translated_then_not_done() {
    let response = status_response(json!({"status": "running", "progress": 0.4}));

    let progress = ExportProgress::from_response(&response);

    assert_eq!(progress.status, ExportStatus::Running);
    assert_eq!(progress.progress, 0.4);
    assert!(!progress.done);
    assert_eq!(progress.error, None);
}

/// **VALUE**: Verifies every status other than running ends polling.
///
/// **WHY THIS MATTERS**: `idle` shows up when the engine restarted and lost the job; if it
/// did not end the loop the host would poll forever.
///
/// **BUG THIS CATCHES**: Would catch treating only `complete` as terminal.
#[test]
fn given_terminal_statuses_when_translated_then_done() {
    for status in ["complete", "cancelled", "error", "idle"] {
        let response = status_response(json!({"status": status, "progress": 1.0}));

        let progress = ExportProgress::from_response(&response);

        assert!(progress.done, "{status} should end polling");
    }
}

/// **VALUE**: Verifies the engine's error text is carried to the UI.
#[test]
fn given_error_status_when_translated_then_error_is_carried() {
    let mut response = status_response(json!({"status": "error", "progress": 0.2}));
    response.error = Some("codec not found".into());

    let progress = ExportProgress::from_response(&response);

    assert_eq!(progress.status, ExportStatus::Error);
    assert_eq!(progress.error.as_deref(), Some("codec not found"));
}

/// **VALUE**: Verifies an unknown status stops polling with an error.
///
/// **BUG THIS CATCHES**: Would catch an unknown status being mapped to running and polled
/// forever.
#[test]
fn given_unknown_status_when_translated_then_done_with_error() {
    let response = status_response(json!({"status": "paused"}));

    let progress = ExportProgress::from_response(&response);

    assert!(progress.done);
    assert!(progress.error.is_some());
}

/// **VALUE**: Verifies out-of-range progress values are clamped to 0..=1.
#[test]
fn given_progress_out_of_range_when_translated_then_clamped() {
    let response = status_response(json!({"status": "running", "progress": 1.7}));

    assert_eq!(ExportProgress::from_response(&response).progress, 1.0);
}
