use crate::error::frame_ring::FrameRingError;
use crate::frame_ring::header::RingHeader;
use crate::frame_ring::reader::{Frame, FrameRingReader};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, info, trace, warn};
use tokio::time::sleep as TokioSleep;

const REOPEN_INITIAL_INTERVAL: Duration = Duration::from_millis(50);
const REOPEN_MAX_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Default)]
struct FeedState {
    reader: Option<FrameRingReader>,
    last_delivered: Option<u32>,
}

/// Shared handle to the current generation's frame ring.
///
/// The render loop reads through it while the restart path swaps the reader
/// underneath. Every read failure degrades to "no frame this cycle".
#[derive(Clone, Default)]
pub struct FrameFeed {
    state: Arc<Mutex<FeedState>>,
}

impl FrameFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current reader with one mapped from `path`.
    ///
    /// The previous reader is closed even if opening the new one fails.
    pub fn open(&self, path: &Path) -> Result<(), FrameRingError> {
        let opened = FrameRingReader::open(path);

        let mut state = self.state();
        if let Some(mut old) = state.reader.take() {
            old.close();
        }
        state.last_delivered = None;
        state.reader = Some(opened?);
        Ok(())
    }

    /// Open `path`, retrying with exponential backoff until `max_elapsed`.
    ///
    /// A freshly spawned sidecar may announce itself before its ring file is
    /// fully sized, so the first attempts are expected to fail.
    pub async fn reopen_with_backoff(
        &self,
        path: &Path,
        max_elapsed: Duration,
    ) -> Result<(), FrameRingError> {
        self.close();

        let mut backoff = ExponentialBackoff {
            initial_interval: REOPEN_INITIAL_INTERVAL,
            max_interval: REOPEN_MAX_INTERVAL,
            max_elapsed_time: Some(max_elapsed),
            ..Default::default()
        };

        loop {
            match FrameRingReader::open(path) {
                Ok(reader) => {
                    let mut state = self.state();
                    state.reader = Some(reader);
                    state.last_delivered = None;
                    info!("Frame feed attached to {}", path.display());
                    return Ok(());
                }
                Err(e) => match backoff.next_backoff() {
                    Some(duration) => {
                        trace!("Frame ring not ready ({e}), retrying after {duration:?}");
                        TokioSleep(duration).await;
                    }
                    None => {
                        warn!("Giving up on frame ring {}: {e}", path.display());
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Newest frame, or `None` if closed, empty, or unreadable this cycle.
    pub fn read_latest(&self) -> Option<Frame> {
        let mut state = self.state();
        let reader = state.reader.as_ref()?;

        match reader.read_latest_frame() {
            Ok(Some(frame)) => {
                state.last_delivered = Some(frame.write_index);
                Some(frame)
            }
            Ok(None) => None,
            Err(e @ FrameRingError::CorruptSlot { .. }) => {
                debug!("Dropping frame: {e}");
                None
            }
            Err(e) => {
                trace!("No frame: {e}");
                None
            }
        }
    }

    /// Like [`read_latest`](Self::read_latest) but skips a frame already
    /// delivered by a previous call.
    pub fn read_new(&self) -> Option<Frame> {
        let last = self.state().last_delivered;
        let current = self.write_index()?;
        if last == Some(current) {
            return None;
        }
        self.read_latest()
    }

    pub fn write_index(&self) -> Option<u32> {
        self.state().reader.as_ref()?.get_write_index()
    }

    pub fn metadata(&self) -> Option<RingHeader> {
        self.state().reader.as_ref()?.get_metadata().ok()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.state()
            .reader
            .as_ref()
            .map(|reader| reader.path().to_path_buf())
    }

    pub fn is_open(&self) -> bool {
        self.state().reader.is_some()
    }

    pub fn close(&self) {
        let mut state = self.state();
        if let Some(mut reader) = state.reader.take() {
            reader.close();
        }
        state.last_delivered = None;
    }
}
