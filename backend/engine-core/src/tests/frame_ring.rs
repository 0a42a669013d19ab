// Unit tests for frame ring layout helpers
// Integration tests against real mapped files are in integration_tests/frame_ring.rs

use crate::frame_ring::header::{HEADER_SIZE, RingHeader, latest_slot};
use crate::error::frame_ring::FrameRingError;
use crate::frame_ring::reader::{MAX_READ_ATTEMPTS, SlotSource, overtaken, read_latest_from};

use std::cell::{Cell, RefCell};

/// In-memory ring whose writer jumps ahead by a scripted amount during each copy.
struct RacingRing {
    ring_size: u32,
    write_index: Cell<u32>,
    advance_per_copy: RefCell<Vec<u32>>,
    copies: Cell<usize>,
}

impl RacingRing {
    fn new(ring_size: u32, write_index: u32, advance_per_copy: Vec<u32>) -> Self {
        Self {
            ring_size,
            write_index: Cell::new(write_index),
            advance_per_copy: RefCell::new(advance_per_copy),
            copies: Cell::new(0),
        }
    }
}

impl SlotSource for RacingRing {
    fn ring_size(&self) -> u32 {
        self.ring_size
    }

    fn write_index(&self) -> u32 {
        self.write_index.get()
    }

    fn copy_slot(&self, slot: u32) -> Result<Option<Vec<u8>>, FrameRingError> {
        self.copies.set(self.copies.get() + 1);
        let mut advances = self.advance_per_copy.borrow_mut();
        if !advances.is_empty() {
            let advance = advances.remove(0);
            self.write_index
                .set(self.write_index.get().wrapping_add(advance));
        }
        Ok(Some(vec![0xFF, 0xD8, 0xFF, slot as u8]))
    }
}

/// **VALUE**: Verifies the newest slot is `(write_index - 1) % ring_size` for any write count.
///
/// **WHY THIS MATTERS**: Every preview frame is located through this arithmetic. An
/// off-by-one shows the frame from one write ago, or a slot the writer is filling right now.
///
/// **BUG THIS CATCHES**: Would catch using `write_index % ring_size` (the slot being written
/// next) instead of the last completed slot, or mishandling the wrap at `ring_size`.
#[test]
fn given_n_writes_when_latest_slot_computed_then_returns_n_minus_one_mod_ring_size() {
    // GIVEN: A ring of 4 slots
    let ring_size = 4;

    // WHEN/THEN: After N writes the newest frame is in slot (N - 1) % 4
    for writes in 1..=13u32 {
        assert_eq!(
            latest_slot(writes, ring_size),
            Some((writes - 1) % ring_size),
            "wrong slot after {writes} writes"
        );
    }
}

/// **VALUE**: Verifies that a ring nobody has written to yet has no latest slot.
///
/// **WHY THIS MATTERS**: The host maps the file as soon as the engine announces it,
/// usually before the first frame exists.
///
/// **BUG THIS CATCHES**: Would catch `0u32 - 1` wrapping to slot `u32::MAX % ring_size`
/// and returning whatever garbage sits in the last slot.
#[test]
fn given_zero_writes_when_latest_slot_computed_then_returns_none() {
    assert_eq!(latest_slot(0, 4), None);
}

/// **VALUE**: Verifies an empty ring never yields a slot.
///
/// **BUG THIS CATCHES**: Would catch a division by zero on a header declaring `ring_size = 0`.
#[test]
fn given_zero_ring_size_when_latest_slot_computed_then_returns_none() {
    assert_eq!(latest_slot(7, 0), None);
}

/// **VALUE**: Verifies slot arithmetic keeps working when `write_index` wraps past `u32::MAX`.
///
/// **WHY THIS MATTERS**: At 60 fps the counter wraps after roughly two years of uptime.
///
/// **BUG THIS CATCHES**: Would catch overflow panics in debug builds when computing the slot
/// for `write_index = u32::MAX`.
#[test]
fn given_max_write_index_when_latest_slot_computed_then_does_not_overflow() {
    assert_eq!(latest_slot(u32::MAX, 4), Some((u32::MAX - 1) % 4));
}

/// **VALUE**: Verifies header encoding matches the documented byte layout.
///
/// **WHY THIS MATTERS**: The engine writes this header from another process; the host must
/// read each field from exactly the offset the engine wrote it to.
///
/// **BUG THIS CATCHES**: Would catch swapped offsets (e.g. slot_size and ring_size) or
/// big-endian encoding.
#[test]
fn given_header_when_encoded_then_fields_land_at_documented_offsets() {
    // GIVEN: A header with distinct values
    let header = RingHeader {
        write_index: 1,
        frame_count: 2,
        slot_size: 4 * 1024 * 1024,
        ring_size: 4,
        width: 1920,
        height: 1080,
    };

    // WHEN: Encoding
    let bytes = header.encode();

    // THEN: Little-endian u32s at 0, 4, 8, 12, 16, 20 and zeroed reserved bytes
    assert_eq!(bytes.len(), HEADER_SIZE);
    assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
    assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
    assert_eq!(&bytes[8..12], &(4u32 * 1024 * 1024).to_le_bytes());
    assert_eq!(&bytes[12..16], &4u32.to_le_bytes());
    assert_eq!(&bytes[16..20], &1920u32.to_le_bytes());
    assert_eq!(&bytes[20..24], &1080u32.to_le_bytes());
    assert!(bytes[24..].iter().all(|b| *b == 0));
    assert_eq!(RingHeader::decode(&bytes), Some(header));
}

/// **VALUE**: Verifies decoding refuses a buffer shorter than a full header.
///
/// **BUG THIS CATCHES**: Would catch an out-of-bounds slice panic on a truncated file.
#[test]
fn given_truncated_bytes_when_header_decoded_then_returns_none() {
    assert_eq!(RingHeader::decode(&[0u8; HEADER_SIZE - 1]), None);
}

/// **VALUE**: Verifies the file size check covers the header plus every slot.
///
/// **BUG THIS CATCHES**: Would catch forgetting the 64 byte header, which lets a reader map a
/// file whose last slot runs past EOF.
#[test]
fn given_geometry_when_required_size_computed_then_includes_header() {
    let header = RingHeader {
        slot_size: 1024,
        ring_size: 4,
        ..Default::default()
    };

    assert_eq!(header.required_file_size(), 64 + 4 * 1024);
    assert_eq!(header.slot_offset(0), 64);
    assert_eq!(header.slot_offset(3), 64 + 3 * 1024);
}

/// **VALUE**: Verifies a copy is kept while the writer stays clear of the copied slot.
///
/// **WHY THIS MATTERS**: The reader discards copies the writer may have touched. If it is too
/// strict, a fast writer starves the preview; if it is too lax, spliced frames get through.
///
/// **BUG THIS CATCHES**: Would catch discarding on any index change, which in a 4-slot ring
/// throws away perfectly good frames whenever one new frame lands during the copy.
#[test]
fn given_writer_advanced_less_than_ring_minus_one_when_checked_then_not_overtaken() {
    assert!(!overtaken(10, 10, 4));
    assert!(!overtaken(10, 11, 4));
    assert!(!overtaken(10, 12, 4));
}

/// **VALUE**: Verifies a copy is discarded once the writer may have reached the copied slot.
///
/// **BUG THIS CATCHES**: Would catch an off-by-one that accepts a copy after the writer
/// started rewriting the slot (`ring_size - 1` frames later).
#[test]
fn given_writer_advanced_ring_minus_one_when_checked_then_overtaken() {
    assert!(overtaken(10, 13, 4));
    assert!(overtaken(10, 20, 4));
}

/// **VALUE**: Verifies a single-slot ring treats any new frame as an overwrite.
///
/// **BUG THIS CATCHES**: Would catch `ring_size - 1 = 0` making every copy look overtaken, or
/// no copy ever look overtaken.
#[test]
fn given_single_slot_ring_when_checked_then_any_advance_overtakes() {
    assert!(!overtaken(5, 5, 1));
    assert!(overtaken(5, 6, 1));
}

/// **VALUE**: Verifies the overtake check handles `write_index` wrapping.
///
/// **BUG THIS CATCHES**: Would catch a plain subtraction that underflows (or reports a huge
/// advance) when the index wraps from `u32::MAX` to 0 during a copy.
#[test]
fn given_wrapped_write_index_when_checked_then_uses_wrapping_distance() {
    assert!(!overtaken(u32::MAX, 0, 4));
    assert!(overtaken(u32::MAX - 1, 2, 4));
}

/// **VALUE**: Verifies a writer that laps every copy yields no frame after the attempt limit.
///
/// **WHY THIS MATTERS**: When the engine writes faster than the host can copy, every copy may
/// be torn. Handing a torn JPEG to the preview shows garbage, and retrying forever stalls the
/// frame loop.
///
/// **BUG THIS CATCHES**: Would catch returning the torn copy, retrying without a bound, or
/// giving up before the third attempt.
#[test]
fn given_writer_overtakes_every_copy_when_reading_then_none_after_three_attempts() {
    // GIVEN: A 4-slot ring whose writer moves a full lap during every copy
    let ring = RacingRing::new(4, 10, vec![4; 10]);

    // WHEN: Reading the newest frame
    let frame = read_latest_from(&ring).unwrap();

    // THEN: No frame, and exactly three copies were attempted
    assert_eq!(frame, None);
    assert_eq!(ring.copies.get(), MAX_READ_ATTEMPTS);
    assert_eq!(MAX_READ_ATTEMPTS, 3);
}

/// **VALUE**: Verifies a retry after one torn copy returns the frame chosen on the retry.
///
/// **BUG THIS CATCHES**: Would catch reusing the slot from the first attempt instead of
/// re-reading `write_index`, or giving up after a single torn copy.
#[test]
fn given_writer_overtakes_first_copy_only_when_reading_then_second_attempt_succeeds() {
    // GIVEN: The writer jumps three frames during the first copy only
    let ring = RacingRing::new(4, 10, vec![3]);

    // WHEN: Reading the newest frame
    let frame = read_latest_from(&ring).unwrap().expect("second copy is intact");

    // THEN: The frame comes from the index seen on the second attempt
    assert_eq!(ring.copies.get(), 2);
    assert_eq!(frame.write_index, 13);
    assert_eq!(frame.slot, latest_slot(13, 4).unwrap());
    assert_eq!(frame.bytes[3], frame.slot as u8);
}

/// **VALUE**: Verifies a writer that moves less than `ring_size - 1` does not force a retry.
///
/// **BUG THIS CATCHES**: Would catch treating any index movement as a torn copy, which drops
/// nearly every frame while the engine is playing.
#[test]
fn given_writer_advances_one_frame_during_copy_when_reading_then_first_copy_kept() {
    let ring = RacingRing::new(4, 10, vec![1]);

    let frame = read_latest_from(&ring).unwrap().expect("copy is intact");

    assert_eq!(ring.copies.get(), 1);
    assert_eq!(frame.write_index, 10);
}
