use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Connected,
    Disconnected,
    Restarting,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthState::Connected => "connected",
            HealthState::Disconnected => "disconnected",
            HealthState::Restarting => "restarting",
        };
        f.write_str(name)
    }
}

/// Snapshot of the sidecar's health as shown to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub state: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
}

impl HealthStatus {
    pub fn connected(uptime_s: Option<f64>, generation: u64) -> Self {
        Self {
            state: HealthState::Connected,
            uptime_s,
            generation: Some(generation),
        }
    }

    pub fn disconnected(generation: Option<u64>) -> Self {
        Self {
            state: HealthState::Disconnected,
            uptime_s: None,
            generation,
        }
    }

    pub fn restarting(generation: Option<u64>) -> Self {
        Self {
            state: HealthState::Restarting,
            uptime_s: None,
            generation,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == HealthState::Connected
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::disconnected(None)
    }
}
