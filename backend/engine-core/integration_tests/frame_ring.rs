use crate::support::{MIN_RING_FILE, RingWriter, jpeg_frame};

use engine_core::error::frame_ring::FrameRingError;
use engine_core::frame_ring::{FrameFeed, FrameRingReader, JPEG_SOI};

use std::time::Duration;

use tempfile::TempDir;

const MIB: u32 = 1024 * 1024;

// ============================================================================
// FrameRingReader against real mapped files
// ============================================================================

/// **VALUE**: Reads the first frame out of a 4 x 4 MiB ring.
///
/// **WHY THIS MATTERS**: This is the preview path: the engine writes one JPEG, the host must
/// see exactly those bytes starting with the JPEG start-of-image marker.
///
/// **BUG THIS CATCHES**: Would catch reading the slot the writer fills next (slot 1) instead of
/// the newest complete one (slot 0), or returning the length prefix as part of the payload.
#[test]
fn given_one_frame_written_when_reading_latest_then_returns_slot_zero_jpeg() {
    // GIVEN: A 4 slot ring of 4 MiB slots with one frame written
    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames"), 4 * MIB, 4);
    let payload = jpeg_frame(1, 50_000);
    writer.write_frame(&payload);

    // WHEN: Opening a reader and reading the latest frame
    let reader = FrameRingReader::open(writer.path()).expect("ring should open");
    let frame = reader
        .read_latest_frame()
        .expect("read should succeed")
        .expect("a frame was written");

    // THEN: Slot 0, byte-for-byte payload, JPEG marker first
    assert_eq!(reader.get_write_index(), Some(1));
    assert_eq!(frame.slot, 0);
    assert_eq!(frame.bytes, payload);
    assert_eq!(&frame.bytes[..3], &JPEG_SOI);
    assert!(frame.is_jpeg());
}

/// **VALUE**: A freshly created ring has no frame.
///
/// **BUG THIS CATCHES**: Would catch returning the (zeroed) contents of the last slot as a frame.
#[test]
fn given_no_frames_written_when_reading_latest_then_returns_none() {
    let dir = TempDir::new().unwrap();
    let writer = RingWriter::create(&dir.path().join("frames"), 1024, 4);

    let reader = FrameRingReader::open(writer.path()).unwrap();

    assert_eq!(reader.get_write_index(), Some(0));
    assert_eq!(reader.read_latest_frame().unwrap(), None);
}

/// **VALUE**: The newest frame wins after the ring wraps.
///
/// **WHY THIS MATTERS**: The engine writes continuously; after a few seconds every slot has
/// been reused many times.
///
/// **BUG THIS CATCHES**: Would catch slot arithmetic that ignores wrapping and reads an old frame.
#[test]
fn given_ring_wrapped_when_reading_latest_then_returns_newest_frame() {
    // GIVEN: Six frames in a four slot ring
    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames"), 1024, 4);
    for tag in 1..=6u8 {
        writer.write_frame(&jpeg_frame(tag, 100 + tag as usize));
    }

    // WHEN: Reading
    let reader = FrameRingReader::open(writer.path()).unwrap();
    let frame = reader.read_latest_frame().unwrap().unwrap();

    // THEN: Frame 6, stored in slot (6 - 1) % 4 = 1
    assert_eq!(frame.write_index, 6);
    assert_eq!(frame.slot, 1);
    assert_eq!(frame.bytes, jpeg_frame(6, 106));
}

/// **VALUE**: A reader sees frames written after it was opened.
///
/// **BUG THIS CATCHES**: Would catch caching `write_index` at open time instead of reading it
/// from the shared mapping on every call.
#[test]
fn given_open_reader_when_writer_adds_frame_then_reader_sees_it() {
    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames"), 1024, 4);
    let reader = FrameRingReader::open(writer.path()).unwrap();
    assert_eq!(reader.read_latest_frame().unwrap(), None);

    writer.write_frame(&jpeg_frame(9, 64));

    let frame = reader.read_latest_frame().unwrap().unwrap();
    assert_eq!(frame.bytes, jpeg_frame(9, 64));
}

/// **VALUE**: A zero length slot yields no frame.
#[test]
fn given_zero_length_slot_when_reading_latest_then_returns_none() {
    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames"), 1024, 4);
    writer.write_slot_raw(0, 0, &[]);
    writer.set_write_index(1);

    let reader = FrameRingReader::open(writer.path()).unwrap();

    assert_eq!(reader.read_latest_frame().unwrap(), None);
}

/// **VALUE**: A length prefix larger than the slot is reported as a corrupt slot.
///
/// **WHY THIS MATTERS**: The reader must never copy bytes belonging to the next slot or past the
/// end of the mapping because of a bad prefix.
///
/// **BUG THIS CATCHES**: Would catch missing bounds checks that read out of range or panic.
#[test]
fn given_length_beyond_slot_when_reading_latest_then_returns_corrupt_slot() {
    // GIVEN: Slot 0 claims 5000 bytes in a 1024 byte slot
    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames"), 1024, 4);
    writer.write_slot_raw(0, 5_000, &[0xFF, 0xD8, 0xFF]);
    writer.set_write_index(1);

    // WHEN: Reading
    let reader = FrameRingReader::open(writer.path()).unwrap();
    let result = reader.read_latest_frame();

    // THEN: CorruptSlot, not a panic and not garbage
    assert!(matches!(result, Err(FrameRingError::CorruptSlot { .. })));
}

/// **VALUE**: After `close()` every call reports closed.
///
/// **BUG THIS CATCHES**: Would catch a use-after-unmap, or `get_write_index()` returning the last
/// value seen instead of the closed sentinel.
#[test]
fn given_closed_reader_when_used_then_reports_closed() {
    // GIVEN: An open reader with a frame available
    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames"), 1024, 4);
    writer.write_frame(&jpeg_frame(1, 10));
    let mut reader = FrameRingReader::open(writer.path()).unwrap();

    // WHEN: Closing (twice)
    reader.close();
    reader.close();

    // THEN: Closed everywhere
    assert!(reader.is_closed());
    assert_eq!(reader.get_write_index(), None);
    assert!(matches!(
        reader.read_latest_frame(),
        Err(FrameRingError::Closed { .. })
    ));
    assert!(matches!(
        reader.get_metadata(),
        Err(FrameRingError::Closed { .. })
    ));
}

/// **VALUE**: Metadata mirrors the header the engine wrote.
#[test]
fn given_ring_when_metadata_requested_then_matches_header() {
    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames"), 2048, 3);
    writer.write_frame(&jpeg_frame(1, 10));
    writer.write_frame(&jpeg_frame(2, 10));

    let reader = FrameRingReader::open(writer.path()).unwrap();
    let header = reader.get_metadata().unwrap();

    assert_eq!(header.write_index, 2);
    assert_eq!(header.slot_size, 2048);
    assert_eq!(header.ring_size, 3);
    assert_eq!((header.width, header.height), (1280, 720));
}

/// **VALUE**: A missing file is an open error carrying the io source.
#[test]
fn given_missing_file_when_opening_then_returns_open_error() {
    let dir = TempDir::new().unwrap();

    let result = FrameRingReader::open(dir.path().join("does-not-exist"));

    match result {
        Err(FrameRingError::Open { source, .. }) => assert!(source.is_some()),
        Err(other) => panic!("expected Open error, got {other}"),
        Ok(_) => panic!("expected Open error, got a reader"),
    }
}

/// **VALUE**: A file smaller than header plus one length prefix is rejected.
#[test]
fn given_tiny_file_when_opening_then_returns_open_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frames");
    std::fs::write(&path, vec![0u8; MIN_RING_FILE - 1]).unwrap();

    assert!(matches!(
        FrameRingReader::open(&path),
        Err(FrameRingError::Open { .. })
    ));
}

/// **VALUE**: A file shorter than its declared geometry is rejected.
///
/// **WHY THIS MATTERS**: The engine may announce itself before it finished sizing the file;
/// mapping it anyway would make reads of the last slots run off the end.
///
/// **BUG THIS CATCHES**: Would catch only checking the header size and not the slots.
#[test]
fn given_undersized_file_when_opening_then_returns_open_error() {
    // GIVEN: A header declaring 4 x 4 MiB but only 1 KiB of file
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frames");
    let writer = RingWriter::create(&path, 4 * MIB, 4);
    drop(writer);
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(1024).unwrap();

    // WHEN/THEN: Open fails
    assert!(matches!(
        FrameRingReader::open(&path),
        Err(FrameRingError::Open { .. })
    ));
}

// ============================================================================
// FrameFeed
// ============================================================================

/// **VALUE**: `read_new()` delivers each frame once.
///
/// **WHY THIS MATTERS**: The render loop runs faster than the engine produces frames; decoding
/// the same JPEG 60 times a second wastes a core.
///
/// **BUG THIS CATCHES**: Would catch `read_new()` returning the same frame on every call.
#[test]
fn given_feed_when_read_new_called_twice_then_second_call_returns_none() {
    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames"), 1024, 4);
    writer.write_frame(&jpeg_frame(1, 10));
    let feed = FrameFeed::new();
    feed.open(writer.path()).unwrap();

    assert!(feed.read_new().is_some());
    assert!(feed.read_new().is_none());

    writer.write_frame(&jpeg_frame(2, 10));
    assert_eq!(feed.read_new().unwrap().write_index, 2);
}

/// **VALUE**: A corrupt slot degrades to "no frame" through the feed.
#[test]
fn given_corrupt_slot_when_feed_reads_then_returns_none() {
    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames"), 1024, 4);
    writer.write_slot_raw(0, 4_096, &[0xFF]);
    writer.set_write_index(1);
    let feed = FrameFeed::new();
    feed.open(writer.path()).unwrap();

    assert!(feed.read_latest().is_none());
}

/// **VALUE**: A closed or never-opened feed reads as "no frame".
#[test]
fn given_closed_feed_when_reading_then_returns_none() {
    let feed = FrameFeed::new();
    assert!(feed.read_latest().is_none());
    assert_eq!(feed.write_index(), None);

    let dir = TempDir::new().unwrap();
    let mut writer = RingWriter::create(&dir.path().join("frames"), 1024, 4);
    writer.write_frame(&jpeg_frame(1, 10));
    feed.open(writer.path()).unwrap();
    feed.close();

    assert!(!feed.is_open());
    assert!(feed.read_latest().is_none());
}

/// **VALUE**: The feed waits for a ring file that appears shortly after the engine announced it.
///
/// **WHY THIS MATTERS**: A restarted engine creates its ring asynchronously; the first open
/// attempt right after the announcement usually fails.
///
/// **BUG THIS CATCHES**: Would catch giving up on the first failed open.
#[tokio::test]
async fn given_file_created_late_when_reopening_with_backoff_then_attaches() {
    // GIVEN: A path that does not exist yet
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frames");
    let feed = FrameFeed::new();

    let writer_path = path.clone();
    let creator = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut writer = RingWriter::create(&writer_path, 1024, 4);
        writer.write_frame(&jpeg_frame(7, 32));
        writer
    });

    // WHEN: Reopening with a generous deadline
    let result = feed
        .reopen_with_backoff(&path, Duration::from_secs(5))
        .await;
    let _writer = creator.await.unwrap();

    // THEN: Attached and reading
    assert!(result.is_ok(), "reopen failed: {result:?}");
    assert_eq!(feed.path(), Some(path));
}

/// **VALUE**: Reopening gives up after the deadline with the last open error.
#[tokio::test]
async fn given_file_never_created_when_reopening_then_returns_open_error() {
    let dir = TempDir::new().unwrap();
    let feed = FrameFeed::new();

    let result = feed
        .reopen_with_backoff(&dir.path().join("never"), Duration::from_millis(300))
        .await;

    assert!(matches!(result, Err(FrameRingError::Open { .. })));
    assert!(!feed.is_open());
}
