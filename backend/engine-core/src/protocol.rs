//! JSON envelopes exchanged with the sidecar.
//!
//! Requests are flat objects: `{"cmd": ..., "id": ..., "_token": ..., <fields>}`.
//! Replies echo `id` and carry `ok`, an optional `error`, and command specific
//! fields. The ping reply has no `ok` and reports `status: "alive"` instead.

use crate::error::transport::TransportError;

use common::RedactedToken;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PING: &str = "ping";
pub const SHUTDOWN: &str = "shutdown";
pub const SEEK: &str = "seek";
pub const RENDER_FRAME: &str = "render_frame";
pub const APPLY_CHAIN: &str = "apply_chain";
pub const EXPORT_START: &str = "export_start";
pub const EXPORT_STATUS: &str = "export_status";
pub const EXPORT_CANCEL: &str = "export_cancel";

/// Commands that can keep the engine busy long enough to miss pings.
pub const HEAVY_COMMANDS: [&str; 4] = [RENDER_FRAME, APPLY_CHAIN, EXPORT_START, SEEK];

const CMD_KEY: &str = "cmd";
const ID_KEY: &str = "id";
const TOKEN_KEY: &str = "_token";
const ALIVE_STATUS: &str = "alive";

/// A command as submitted by the UI, before it is stamped with id and token.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCommand {
    cmd: String,
    fields: Map<String, Value>,
}

impl EngineCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            fields: Map::new(),
        }
    }

    /// Build from a UI payload. Envelope keys in `fields` are ignored.
    pub fn with_fields(cmd: impl Into<String>, fields: Map<String, Value>) -> Self {
        let mut command = Self::new(cmd);
        for (key, value) in fields {
            command = command.with_field(key, value);
        }
        command
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !is_envelope_key(&key) {
            self.fields.insert(key, value.into());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.cmd
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn is_heavy(&self) -> bool {
        HEAVY_COMMANDS.contains(&self.cmd.as_str())
    }
}

fn is_envelope_key(key: &str) -> bool {
    matches!(key, CMD_KEY | ID_KEY | TOKEN_KEY)
}

/// Serialize `command` stamped with `id` and the session token.
pub fn encode_request(
    command: &EngineCommand,
    id: &str,
    token: &RedactedToken,
) -> Result<String, TransportError> {
    let mut body = command.fields.clone();
    body.insert(CMD_KEY.to_string(), Value::from(command.cmd.as_str()));
    body.insert(ID_KEY.to_string(), Value::from(id));
    body.insert(TOKEN_KEY.to_string(), Value::from(token.as_str()));

    Ok(serde_json::to_string(&Value::Object(body))?)
}

/// Reply to one command. Failures produced by the host itself use the same
/// shape so callers never have to distinguish the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EngineResponse {
    pub fn failure(id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            error: Some(error.into()),
            fields: Map::new(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.field(key).and_then(Value::as_f64)
    }
}

/// Parse a reply and check that it answers request `expected_id`.
///
/// A reply without an id is accepted: the engine cannot echo the id of a
/// request it failed to decode.
///
/// # Errors
///
/// [`TransportError::Protocol`] for invalid JSON or an id that belongs to
/// another request.
pub fn decode_response(raw: &str, expected_id: &str) -> Result<EngineResponse, TransportError> {
    let response: EngineResponse = serde_json::from_str(raw)?;

    match response.id.as_deref() {
        Some(id) if id != expected_id => Err(TransportError::protocol(format!(
            "reply id {id} does not match request {expected_id}"
        ))),
        _ => Ok(response),
    }
}

/// Liveness answer from the health endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PingReply {
    pub uptime_s: Option<f64>,
    pub last_frame_ms: Option<f64>,
}

impl PingReply {
    /// # Errors
    ///
    /// [`TransportError::Protocol`] unless the reply reports `status: "alive"`.
    pub fn from_response(response: &EngineResponse) -> Result<Self, TransportError> {
        match response.str_field("status") {
            Some(ALIVE_STATUS) => Ok(Self {
                uptime_s: response.f64_field("uptime_s"),
                last_frame_ms: response.f64_field("last_frame_ms"),
            }),
            status => Err(TransportError::protocol(format!(
                "engine not alive (status {status:?}, error {:?})",
                response.error
            ))),
        }
    }
}
