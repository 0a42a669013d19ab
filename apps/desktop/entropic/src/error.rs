use common::ErrorLocation;

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the host application.
///
/// Serializable so a UI bridge can forward them unchanged, with location
/// tracking kept for the log.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum HostError {
    /// Error from the host itself (directories, startup wiring)
    #[error("Host Error: {message} {location}")]
    Host {
        message: String,
        location: ErrorLocation,
    },

    /// Error from engine-core operations (config, spawn, frame ring)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    /// Logger could not be installed
    #[error("Logger Error: {message} {location}")]
    Logger {
        message: String,
        location: ErrorLocation,
    },
}
