//! Shared-memory frame transport.
//!
//! The sidecar writes encoded preview frames into a file-backed ring buffer and
//! any number of host-side readers map the same file read-only. There is no
//! lock between the writer and the readers.
//!
//! # Layout
//!
//! ```text
//! offset 0   write_index  u32 LE  frames ever written (wraps at 2^32)
//! offset 4   frame_count  u32 LE
//! offset 8   slot_size    u32 LE  bytes per slot
//! offset 12  ring_size    u32 LE  number of slots
//! offset 16  width        u32 LE
//! offset 20  height       u32 LE
//! offset 24  reserved     40 bytes
//! offset 64  slot 0, slot 1, ... each `slot_size` bytes:
//!            [length u32 LE][length bytes of encoded image]
//! ```
//!
//! The newest frame lives in slot `(write_index - 1) % ring_size`.

pub(crate) mod feed;
pub(crate) mod header;
pub(crate) mod reader;

pub use feed::FrameFeed;
pub use header::{HEADER_SIZE, LENGTH_PREFIX_SIZE, RingHeader, latest_slot};
pub use reader::{Frame, FrameRingReader, JPEG_SOI, MAX_READ_ATTEMPTS};
