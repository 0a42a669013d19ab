//! Startup announcement printed by the sidecar on stdout.
//!
//! The sidecar binds its sockets on ephemeral ports and reports them as
//! `KEY=value` tokens, e.g. `ZMQ_PORT=5555 ZMQ_PING_PORT=5556 ZMQ_TOKEN=abc`.
//! Tokens may be spread over several lines or share one. The `ENGINE_`
//! spellings of the same keys are accepted too.

use crate::error::spawn::SpawnError;

use common::RedactedToken;

use std::path::PathBuf;
use std::sync::OnceLock;

use log::{debug, trace};
use regex::Regex;

pub const CONTROL_PORT_KEY: &str = "ZMQ_PORT";
pub const HEALTH_PORT_KEY: &str = "ZMQ_PING_PORT";
pub const TOKEN_KEY: &str = "ZMQ_TOKEN";
pub const SHM_PATH_KEY: &str = "ZMQ_SHM_PATH";

const CONTROL_PORT_ALIAS: &str = "ENGINE_PORT";
const HEALTH_PORT_ALIAS: &str = "ENGINE_PING_PORT";
const TOKEN_ALIAS: &str = "ENGINE_TOKEN";
const SHM_PATH_ALIAS: &str = "ENGINE_SHM_PATH";

const ANNOUNCEMENT_PATTERN: &str = r"(?:^|\s)(?P<key>[A-Z][A-Z0-9_]*)=(?P<value>\S+)";
const CAPTURE_KEY: &str = "key";
const CAPTURE_VALUE: &str = "value";

static ANNOUNCEMENT_REGEX: OnceLock<Regex> = OnceLock::new();

pub(crate) fn get_announcement_regex() -> &'static Regex {
    ANNOUNCEMENT_REGEX
        .get_or_init(|| Regex::new(ANNOUNCEMENT_PATTERN).expect("valid regex pattern"))
}

/// Everything the host needs to talk to a freshly started sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub control_port: u16,
    pub health_port: u16,
    pub token: RedactedToken,
    pub shm_path: Option<PathBuf>,
}

/// Accumulates announcement tokens line by line.
#[derive(Debug, Default)]
pub struct AnnouncementParser {
    control_port: Option<u16>,
    health_port: Option<u16>,
    token: Option<RedactedToken>,
    shm_path: Option<PathBuf>,
}

impl AnnouncementParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line of output. Unknown keys and free text are ignored.
    ///
    /// # Errors
    ///
    /// [`SpawnError::Parse`] if a port key carries something other than a
    /// valid non-zero port.
    pub fn feed(&mut self, line: &str) -> Result<(), SpawnError> {
        for cap in get_announcement_regex().captures_iter(line) {
            let (Some(key), Some(value)) = (cap.name(CAPTURE_KEY), cap.name(CAPTURE_VALUE)) else {
                continue;
            };

            match key.as_str() {
                CONTROL_PORT_KEY | CONTROL_PORT_ALIAS => {
                    self.control_port = Some(parse_port(key.as_str(), value.as_str())?);
                }
                HEALTH_PORT_KEY | HEALTH_PORT_ALIAS => {
                    self.health_port = Some(parse_port(key.as_str(), value.as_str())?);
                }
                TOKEN_KEY | TOKEN_ALIAS => {
                    let token = RedactedToken::new(value.as_str());
                    debug!("Engine announced token {token:?}");
                    self.token = Some(token);
                }
                SHM_PATH_KEY | SHM_PATH_ALIAS => self.shm_path = Some(PathBuf::from(value.as_str())),
                other => trace!("Ignoring announcement key {other}"),
            }
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.control_port.is_some() && self.health_port.is_some() && self.token.is_some()
    }

    /// Required keys not seen yet.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.control_port.is_none() {
            missing.push(CONTROL_PORT_KEY);
        }
        if self.health_port.is_none() {
            missing.push(HEALTH_PORT_KEY);
        }
        if self.token.is_none() {
            missing.push(TOKEN_KEY);
        }
        missing
    }

    /// The announcement, once every required key has been seen.
    pub fn finish(self) -> Option<Announcement> {
        Some(Announcement {
            control_port: self.control_port?,
            health_port: self.health_port?,
            token: self.token?,
            shm_path: self.shm_path,
        })
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, SpawnError> {
    match value.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        Ok(_) => Err(SpawnError::parse(format!("{key} announced port 0"))),
        Err(e) => Err(SpawnError::parse(format!(
            "{key} announced invalid port '{value}': {e}"
        ))),
    }
}
