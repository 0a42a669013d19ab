use serde::Serialize;

/// Fixed size of the ring header in bytes.
pub const HEADER_SIZE: usize = 64;

/// Size of the little-endian length prefix at the start of every slot.
pub const LENGTH_PREFIX_SIZE: usize = 4;

pub(crate) const WRITE_INDEX_OFFSET: usize = 0;
const FRAME_COUNT_OFFSET: usize = 4;
const SLOT_SIZE_OFFSET: usize = 8;
const RING_SIZE_OFFSET: usize = 12;
const WIDTH_OFFSET: usize = 16;
const HEIGHT_OFFSET: usize = 20;

/// Snapshot of the ring header fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RingHeader {
    pub write_index: u32,
    pub frame_count: u32,
    pub slot_size: u32,
    pub ring_size: u32,
    pub width: u32,
    pub height: u32,
}

impl RingHeader {
    /// Decode a header from the first bytes of a ring file.
    ///
    /// Returns `None` if fewer than [`HEADER_SIZE`] bytes are available.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }

        Some(Self {
            write_index: read_u32_le(bytes, WRITE_INDEX_OFFSET)?,
            frame_count: read_u32_le(bytes, FRAME_COUNT_OFFSET)?,
            slot_size: read_u32_le(bytes, SLOT_SIZE_OFFSET)?,
            ring_size: read_u32_le(bytes, RING_SIZE_OFFSET)?,
            width: read_u32_le(bytes, WIDTH_OFFSET)?,
            height: read_u32_le(bytes, HEIGHT_OFFSET)?,
        })
    }

    /// Encode into the on-disk layout, reserved bytes zeroed.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let fields = [
            (WRITE_INDEX_OFFSET, self.write_index),
            (FRAME_COUNT_OFFSET, self.frame_count),
            (SLOT_SIZE_OFFSET, self.slot_size),
            (RING_SIZE_OFFSET, self.ring_size),
            (WIDTH_OFFSET, self.width),
            (HEIGHT_OFFSET, self.height),
        ];
        for (offset, value) in fields {
            out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Minimum file size that can hold this header and every slot.
    pub fn required_file_size(&self) -> u64 {
        HEADER_SIZE as u64 + u64::from(self.ring_size) * u64::from(self.slot_size)
    }

    /// Byte offset of a slot's length prefix.
    pub fn slot_offset(&self, slot: u32) -> u64 {
        HEADER_SIZE as u64 + u64::from(slot) * u64::from(self.slot_size)
    }

    /// Slot holding the newest completed frame, if any frame was written.
    pub fn latest_slot(&self) -> Option<u32> {
        latest_slot(self.write_index, self.ring_size)
    }
}

/// Slot index of the most recently completed frame.
///
/// `write_index == 0` means nothing has been written yet. A zero `ring_size`
/// has no valid slot.
pub fn latest_slot(write_index: u32, ring_size: u32) -> Option<u32> {
    if write_index == 0 || ring_size == 0 {
        return None;
    }
    Some((write_index - 1) % ring_size)
}

/// Read a little-endian u32 with a volatile load.
///
/// The bytes may belong to a mapping that another process rewrites at any
/// time, so the value must be fetched from memory on every call.
pub(crate) fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let field = bytes.get(offset..offset.checked_add(4)?)?;
    // SAFETY: `field` is exactly four in-bounds bytes and `[u8; 4]` has
    // alignment 1, so the pointer is valid for a read of that type.
    let raw = unsafe { std::ptr::read_volatile(field.as_ptr() as *const [u8; 4]) };
    Some(u32::from_le_bytes(raw))
}
