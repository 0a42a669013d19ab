use crate::error::frame_ring::FrameRingError;
use crate::frame_ring::header::{
    HEADER_SIZE, LENGTH_PREFIX_SIZE, RingHeader, WRITE_INDEX_OFFSET, latest_slot, read_u32_le,
};

use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info, trace};
use memmap2::Mmap;

/// JPEG start-of-image marker every valid preview frame begins with.
pub const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Copies attempted per `read_latest_frame` call before giving up on a slot
/// the writer keeps overtaking.
pub const MAX_READ_ATTEMPTS: usize = 3;

/// A private copy of one encoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// `write_index` observed when the slot was chosen.
    pub write_index: u32,
    pub slot: u32,
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the payload starts with the JPEG start-of-image marker.
    pub fn is_jpeg(&self) -> bool {
        self.bytes.starts_with(&JPEG_SOI)
    }
}

struct Mapping {
    map: Mmap,
    // Held so the descriptor lives exactly as long as the mapping.
    _file: File,
    slot_size: u32,
    ring_size: u32,
}

/// Where [`read_latest_from`] gets the index and slot bytes.
pub(crate) trait SlotSource {
    fn ring_size(&self) -> u32;

    fn write_index(&self) -> u32;

    /// Payload of `slot`, or `None` for a zero-length slot.
    fn copy_slot(&self, slot: u32) -> Result<Option<Vec<u8>>, FrameRingError>;
}

impl SlotSource for Mapping {
    fn ring_size(&self) -> u32 {
        self.ring_size
    }

    fn write_index(&self) -> u32 {
        read_u32_le(&self.map, WRITE_INDEX_OFFSET).unwrap_or(0)
    }

    fn copy_slot(&self, slot: u32) -> Result<Option<Vec<u8>>, FrameRingError> {
        let file_len = self.map.len() as u64;
        let offset = HEADER_SIZE as u64 + u64::from(slot) * u64::from(self.slot_size);
        let payload_start = offset + LENGTH_PREFIX_SIZE as u64;

        if payload_start > file_len {
            return Err(FrameRingError::corrupt_slot(format!(
                "slot {slot} at offset {offset} exceeds file size {file_len}"
            )));
        }

        let length = read_u32_le(&self.map, offset as usize).unwrap_or(0);
        if length == 0 {
            return Ok(None);
        }

        if u64::from(length) + LENGTH_PREFIX_SIZE as u64 > u64::from(self.slot_size) {
            return Err(FrameRingError::corrupt_slot(format!(
                "slot {slot} length {length} does not fit slot size {}",
                self.slot_size
            )));
        }

        let payload_end = payload_start + u64::from(length);
        if payload_end > file_len {
            return Err(FrameRingError::corrupt_slot(format!(
                "slot {slot} payload ends at {payload_end}, file size {file_len}"
            )));
        }

        Ok(Some(
            self.map[payload_start as usize..payload_end as usize].to_vec(),
        ))
    }
}

/// Lock-free reader over the sidecar's frame ring.
///
/// Opened once per sidecar generation. The mapping is read-only and private to
/// this instance; [`close`](Self::close) releases it and every later call
/// reports the reader as closed.
pub struct FrameRingReader {
    path: PathBuf,
    mapping: Option<Mapping>,
}

impl FrameRingReader {
    /// Map the ring file read-only.
    ///
    /// # Errors
    ///
    /// Returns [`FrameRingError::Open`] if the file cannot be opened or mapped,
    /// if it is smaller than a header plus one length prefix, if the header
    /// declares an empty ring or a slot too small for a length prefix, or if
    /// the file is smaller than `64 + ring_size * slot_size`.
    #[track_caller]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FrameRingError> {
        let path = path.as_ref();

        let file = File::open(path).map_err(|e| {
            FrameRingError::open_io(path, format!("failed to open ring file: {e}"), e)
        })?;

        let file_len = file
            .metadata()
            .map_err(|e| FrameRingError::open_io(path, format!("failed to stat ring file: {e}"), e))?
            .len();

        let minimum = (HEADER_SIZE + LENGTH_PREFIX_SIZE) as u64;
        if file_len < minimum {
            return Err(FrameRingError::open(
                path,
                format!("file is {file_len} bytes, need at least {minimum}"),
            ));
        }

        // SAFETY: the mapping is read-only and every read through it is
        // bounds-checked against its length. The sidecar sizes the file before
        // announcing itself and never truncates it while that generation runs.
        // A later generation may recreate the file in place, so the health
        // monitor closes the reader before killing or respawning the sidecar.
        let map = unsafe { Mmap::map(&file) }
            .map_err(|e| FrameRingError::open_io(path, format!("mmap failed: {e}"), e))?;

        let header = RingHeader::decode(&map)
            .ok_or_else(|| FrameRingError::open(path, "header is truncated"))?;

        if header.ring_size == 0 || (header.slot_size as usize) <= LENGTH_PREFIX_SIZE {
            return Err(FrameRingError::open(
                path,
                format!(
                    "invalid ring geometry: ring_size={}, slot_size={}",
                    header.ring_size, header.slot_size
                ),
            ));
        }

        let required = header.required_file_size();
        if (map.len() as u64) < required {
            return Err(FrameRingError::open(
                path,
                format!(
                    "file is {} bytes, ring of {} x {} needs {required}",
                    map.len(),
                    header.ring_size,
                    header.slot_size
                ),
            ));
        }

        info!(
            "Opened frame ring {} ({} slots x {} bytes, {}x{})",
            path.display(),
            header.ring_size,
            header.slot_size,
            header.width,
            header.height
        );

        Ok(Self {
            path: path.to_path_buf(),
            mapping: Some(Mapping {
                map,
                _file: file,
                slot_size: header.slot_size,
                ring_size: header.ring_size,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.mapping.is_none()
    }

    /// Copy out the newest frame.
    ///
    /// Returns `Ok(None)` when no frame was ever written, when the newest slot
    /// has a zero length, or when the writer overtook the slot on every one of
    /// [`MAX_READ_ATTEMPTS`] copies.
    ///
    /// # Errors
    ///
    /// - [`FrameRingError::Closed`] after [`close`](Self::close)
    /// - [`FrameRingError::CorruptSlot`] if the slot's byte range falls outside
    ///   the slot or the mapped file
    pub fn read_latest_frame(&self) -> Result<Option<Frame>, FrameRingError> {
        let mapping = self
            .mapping
            .as_ref()
            .ok_or_else(|| FrameRingError::closed(&self.path))?;

        read_latest_from(mapping)
    }

    /// Current `write_index`, or `None` once the reader is closed.
    pub fn get_write_index(&self) -> Option<u32> {
        self.mapping.as_ref().map(Mapping::write_index)
    }

    /// Snapshot of every header field.
    ///
    /// # Errors
    ///
    /// Returns [`FrameRingError::Closed`] after [`close`](Self::close).
    pub fn get_metadata(&self) -> Result<RingHeader, FrameRingError> {
        let mapping = self
            .mapping
            .as_ref()
            .ok_or_else(|| FrameRingError::closed(&self.path))?;

        RingHeader::decode(&mapping.map)
            .ok_or_else(|| FrameRingError::corrupt_slot("header no longer readable"))
    }

    /// Release the mapping and file handle. Idempotent.
    pub fn close(&mut self) {
        if self.mapping.take().is_some() {
            debug!("Closed frame ring {}", self.path.display());
        }
    }
}

/// Copy the newest slot, retrying while the writer overtakes the copy.
pub(crate) fn read_latest_from(source: &impl SlotSource) -> Result<Option<Frame>, FrameRingError> {
    let ring_size = source.ring_size();

    for attempt in 1..=MAX_READ_ATTEMPTS {
        let write_index = source.write_index();
        let Some(slot) = latest_slot(write_index, ring_size) else {
            return Ok(None);
        };

        let Some(bytes) = source.copy_slot(slot)? else {
            return Ok(None);
        };

        let after = source.write_index();
        if !overtaken(write_index, after, ring_size) {
            return Ok(Some(Frame {
                write_index,
                slot,
                bytes,
            }));
        }

        trace!(
            "Slot {slot} overwritten during copy (write_index {write_index} -> {after}), attempt {attempt}"
        );
    }

    debug!("Writer overtook every copy attempt, skipping this frame");
    Ok(None)
}

/// Whether the writer may have started rewriting the slot chosen at `before`.
///
/// The slot for frame `before - 1` is rewritten while `write_index` reads
/// `before - 1 + ring_size`, so the copy is intact as long as the index moved
/// by less than `ring_size - 1`. A single-slot ring is rewritten by the very
/// next frame.
pub(crate) fn overtaken(before: u32, after: u32, ring_size: u32) -> bool {
    let advanced = after.wrapping_sub(before);
    advanced >= ring_size.saturating_sub(1).max(1)
}
