use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum FrameRingError {
    /// Missing, unreadable or undersized ring file. Fatal to the reader
    /// instance; callers retry after the next (re)connect.
    #[error("Open Error: {path}: {message} {location}")]
    Open {
        path: PathBuf,
        message: String,
        location: ErrorLocation,
        #[source]
        source: Option<IoError>,
    },

    /// Slot geometry points outside the mapped file. Callers treat this as
    /// "no frame this cycle".
    #[error("Corrupt Slot Error: {message} {location}")]
    CorruptSlot {
        message: String,
        location: ErrorLocation,
    },

    #[error("Closed Error: reader for {path} is closed {location}")]
    Closed {
        path: PathBuf,
        location: ErrorLocation,
    },
}

impl FrameRingError {
    #[track_caller]
    pub fn open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        FrameRingError::Open {
            path: path.into(),
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
            source: None,
        }
    }

    #[track_caller]
    pub fn open_io(path: impl Into<PathBuf>, message: impl Into<String>, source: IoError) -> Self {
        FrameRingError::Open {
            path: path.into(),
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
            source: Some(source),
        }
    }

    #[track_caller]
    pub fn corrupt_slot(message: impl Into<String>) -> Self {
        FrameRingError::CorruptSlot {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn closed(path: impl Into<PathBuf>) -> Self {
        FrameRingError::Closed {
            path: path.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
