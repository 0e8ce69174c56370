//! Segments: immutable slices of a data source.

use crate::error::{Error, Result};
use crate::source::DataSource;

/// Largest offset representable in the buffer's logical or source-relative
/// address space. Kept well below `u64::MAX` so that `start + length`
/// additions throughout the crate cannot wrap silently before the explicit
/// overflow check runs.
pub const OFF_MAX: u64 = i64::MAX as u64;

/// An immutable slice `(source, start, length)` of a [`DataSource`].
///
/// Cheap to clone: cloning a segment clones the `Arc` inside its source, not
/// any bytes.
#[derive(Clone)]
pub struct Segment {
    source: DataSource,
    start: u64,
    length: u64,
}

impl Segment {
    /// Creates a new segment over `[start, start + length)` of `source`.
    ///
    /// Fails with `Error::Overflow` if `start + length` or `start + length`
    /// relative to `OFF_MAX` would overflow, checked before the range
    /// validation against the source's length (§7: overflow is a distinct
    /// diagnosis from an argument error).
    pub fn new(source: DataSource, start: u64, length: u64) -> Result<Self> {
        let end = start.checked_add(length).ok_or(Error::Overflow)?;
        if end > OFF_MAX {
            return Err(Error::Overflow);
        }
        if end > source.length() {
            return Err(Error::Invalid("segment range outside its data source"));
        }
        Ok(Segment {
            source,
            start,
            length,
        })
    }

    /// The data source this segment draws bytes from.
    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Offset of this segment's first byte within its source.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Number of bytes this segment covers.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Offset one past this segment's last byte within its source.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// Reads this segment's bytes into `buf`. `buf.len()` must equal
    /// `self.length()`.
    pub fn read_into(&self, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len() as u64, self.length);
        self.source.read_into(buf, self.start)
    }

    /// Reads `buf.len()` bytes starting at relative offset `rel` within this
    /// segment. Used by the save planner to copy a segment in chunks.
    pub fn read_range_into(&self, rel: u64, buf: &mut [u8]) -> Result<()> {
        self.source.read_into(buf, self.start + rel)
    }

    /// Splits this segment at relative offset `k` into two segments covering
    /// `[0, k)` and `[k, length)` of the original range. Neither half is
    /// ever zero-length on the side that remains meaningful to the caller;
    /// `k == 0` or `k == self.length()` is allowed and simply yields one
    /// empty-looking half, which callers must discard rather than store
    /// (§4.2: no zero-length segment is ever stored in a collection).
    pub fn split(&self, k: u64) -> (Segment, Segment) {
        assert!(k <= self.length, "split point out of range");
        (
            Segment {
                source: self.source.clone(),
                start: self.start,
                length: k,
            },
            Segment {
                source: self.source.clone(),
                start: self.start + k,
                length: self.length - k,
            },
        )
    }

    /// Merges adjacent segments `a` and `b` into one, if they share a source
    /// and `a` ends exactly where `b` begins.
    pub fn merge(a: &Segment, b: &Segment) -> Option<Segment> {
        if a.source.compare(&b.source) && a.end() == b.start {
            Some(Segment {
                source: a.source.clone(),
                start: a.start,
                length: a.length + b.length,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(bytes: &[u8]) -> DataSource {
        DataSource::from_memory(bytes.to_vec())
    }

    #[test]
    fn new_rejects_out_of_range() {
        let src = mem(b"abc");
        assert!(Segment::new(src.clone(), 0, 4).is_err());
        assert!(Segment::new(src, 1, 2).is_ok());
    }

    #[test]
    fn new_rejects_overflow_before_range() {
        let src = mem(b"abc");
        assert!(matches!(
            Segment::new(src, 1, u64::MAX),
            Err(Error::Overflow)
        ));
    }

    #[test]
    fn split_preserves_total_length() {
        let src = mem(b"0123456789");
        let seg = Segment::new(src, 0, 10).unwrap();
        let (left, right) = seg.split(4);
        assert_eq!(left.length() + right.length(), 10);
        assert_eq!(left.start(), 0);
        assert_eq!(right.start(), 4);
    }

    #[test]
    fn merge_adjacent_same_source() {
        let src = mem(b"0123456789");
        let a = Segment::new(src.clone(), 0, 4).unwrap();
        let b = Segment::new(src, 4, 3).unwrap();
        let merged = Segment::merge(&a, &b).unwrap();
        assert_eq!(merged.start(), 0);
        assert_eq!(merged.length(), 7);
    }

    #[test]
    fn merge_rejects_non_adjacent() {
        let src = mem(b"0123456789");
        let a = Segment::new(src.clone(), 0, 4).unwrap();
        let b = Segment::new(src, 5, 3).unwrap();
        assert!(Segment::merge(&a, &b).is_none());
    }

    #[test]
    fn merge_rejects_different_sources() {
        let a = Segment::new(mem(b"0123"), 0, 4).unwrap();
        let b = Segment::new(mem(b"4567"), 0, 4).unwrap();
        assert!(Segment::merge(&a, &b).is_none());
    }
}
