use crate::protocol::EngineResponse;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Idle,
    Running,
    Complete,
    Cancelled,
    Error,
}

impl ExportStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(ExportStatus::Idle),
            "running" => Some(ExportStatus::Running),
            "complete" => Some(ExportStatus::Complete),
            "cancelled" => Some(ExportStatus::Cancelled),
            "error" => Some(ExportStatus::Error),
            _ => None,
        }
    }

    /// Every status except `running` ends the poll loop. `idle` means the
    /// engine has no job at all, e.g. after a restart.
    pub fn is_terminal(self) -> bool {
        self != ExportStatus::Running
    }
}

/// One export progress update delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    pub progress: f64,
    pub status: ExportStatus,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportProgress {
    /// Translate an `export_status` reply. A reply with an unknown status
    /// counts as an error so polling cannot spin forever on it.
    pub fn from_response(response: &EngineResponse) -> Self {
        let progress = response.f64_field("progress").unwrap_or(0.0).clamp(0.0, 1.0);
        let reported_error = response.error.clone();

        match response.str_field("status").and_then(ExportStatus::parse) {
            Some(status) => Self {
                progress,
                status,
                done: status.is_terminal(),
                error: reported_error,
            },
            None => Self {
                progress,
                status: ExportStatus::Error,
                done: true,
                error: reported_error.or_else(|| {
                    Some(format!(
                        "unrecognised export status {:?}",
                        response.field("status")
                    ))
                }),
            },
        }
    }

    pub fn aborted(error: impl Into<String>) -> Self {
        Self {
            progress: 0.0,
            status: ExportStatus::Error,
            done: true,
            error: Some(error.into()),
        }
    }
}
