//! Integration tests encoding the concrete scenarios from `spec.md` §8,
//! exercised through the public crate API only. Table-driven via `rstest`,
//! since §8 itself is table-driven.

mod common;

use std::io::Write;
use std::os::unix::io::AsRawFd;

use bless::{Buffer, DataSource};
use rstest::rstest;

fn mem(bytes: &[u8]) -> DataSource {
    DataSource::from_memory(bytes.to_vec())
}

fn contents(buf: &Buffer) -> Vec<u8> {
    let len = buf.get_size();
    let mut out = vec![0u8; len as usize];
    if len > 0 {
        buf.read(0, &mut out, 0, len).unwrap();
    }
    out
}

#[rstest]
#[case(0, 0, 0, 0, b"" as &[u8], 0)]
#[case(0, 10, 0, 10, b"0123456789" as &[u8], 10)]
fn append_zero_and_nonzero_length(
    #[case] src_off: u64,
    #[case] src_len: u64,
    #[case] expect_off: u64,
    #[case] expect_len: u64,
    #[case] expect: &[u8],
    #[case] expect_size: u64,
) {
    common::init_tracing();
    let _ = (expect_off, expect_len);
    let m = mem(b"0123456789abcdefghij");
    let mut buf = Buffer::new();
    buf.append(&m, src_off, src_len).unwrap();
    assert_eq!(buf.get_size(), expect_size);
    assert_eq!(contents(&buf), expect);
}

#[test]
fn piece_table_basics_scenario_one() {
    common::init_tracing();
    let m = mem(b"0123456789abcdefghij");
    let mut buf = Buffer::new();

    buf.append(&m, 0, 10).unwrap();
    assert_eq!(buf.get_size(), 10);

    buf.insert(4, &m, 10, 3).unwrap();
    assert_eq!(buf.get_size(), 13);
    assert_eq!(contents(&buf), b"0123abc456789");

    buf.delete(5, 4).unwrap();
    assert_eq!(buf.get_size(), 9);
    assert_eq!(contents(&buf), b"0123a6789");
}

#[rstest]
#[case(10, true)]
#[case(9, false)]
fn insert_at_size_boundary(#[case] at: u64, #[case] should_fail: bool) {
    common::init_tracing();
    let m = mem(b"0123456789");
    let mut buf = Buffer::new();
    buf.append(&m, 0, 10).unwrap();
    let result = buf.insert(at, &m, 0, 1);
    assert_eq!(result.is_err(), should_fail);
}

#[test]
fn net_empty_round_trip_rejects_further_reads() {
    common::init_tracing();
    let m = mem(b"0123456789");
    let mut buf = Buffer::new();
    buf.append(&m, 0, 10).unwrap();
    buf.delete(0, 10).unwrap();
    assert_eq!(buf.get_size(), 0);
    let mut out = [0u8; 1];
    assert!(buf.read(0, &mut out, 0, 1).is_err());
}

fn file_source(contents: &[u8]) -> (tempfile::NamedTempFile, libc::c_int) {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents).unwrap();
    f.flush().unwrap();
    let fd = f.as_raw_fd();
    (f, fd)
}

#[test]
fn save_with_self_overlap_matches_scenario_four() {
    common::init_tracing();
    let (f1, fd1) = file_source(b"1234567890");
    let f1_source = DataSource::from_file(f1.path()).unwrap();
    let f2_source = mem(b"abcdefghij");

    let mut buf = Buffer::new();
    buf.append(&f1_source, 0, 3).unwrap();
    buf.append(&f2_source, 0, 3).unwrap();
    buf.append(&f1_source, 3, 7).unwrap();
    assert_eq!(contents(&buf), b"123abc4567890");

    buf.save(fd1, None).unwrap();
    assert_eq!(buf.get_save_revision_id(), buf.get_revision_id());

    let mut reread = std::fs::read(f1.path()).unwrap();
    reread.truncate(13);
    assert_eq!(reread, b"123abc4567890");

    // The live buffer must still read correctly after save: its
    // target-referencing segments now point at their post-save offsets in
    // the rewritten file, not their old pre-save positions.
    assert_eq!(contents(&buf), b"123abc4567890");
}

#[test]
fn undo_after_save_never_drops_history_on_success() {
    common::init_tracing();
    let m = mem(b"0123456789");
    let (f1, fd1) = file_source(b"ten_bytes!");
    let mut buf = Buffer::new();

    buf.set_option("UNDO_AFTER_SAVE", "never").unwrap();
    buf.append(&m, 0, 3).unwrap();
    buf.append(&m, 3, 3).unwrap();
    buf.append(&m, 6, 3).unwrap();
    assert!(buf.can_undo());

    buf.save(fd1, None).unwrap();
    assert!(!buf.can_undo());
    assert!(!buf.can_redo());
    assert_eq!(buf.get_save_revision_id(), buf.get_revision_id());
    drop(f1);
}
