//! The edit buffer core of a hex-editor-class binary editing library: a
//! piece table over immutable data sources, an undo/redo action log, and a
//! safe in-place save planner that correctly rewrites a file even when the
//! new content reorders, overlaps, or repeatedly references regions of that
//! same file.
//!
//! *CAUTION:* the save planner uses `unsafe` OS-specific APIs directly
//! (`pread`/`pwrite`/`mkstemp`/`ftruncate`) rather than going through
//! `std::fs`, since it needs exact control over offsets and file identity.
//!
//! # Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! bless = "0.1"
//! ```
//!
//! The entry point is [`Buffer`]: append, insert and delete ranges of
//! [`DataSource`]s, undo/redo the edits, and `save` to a target file
//! descriptor.
//!
//! ```
//! use bless::{Buffer, DataSource};
//!
//! let mut buf = Buffer::new();
//! let src = DataSource::from_memory(b"hello world".to_vec());
//! buf.append(&src, 0, 11).unwrap();
//! buf.insert(5, &src, 0, 1).unwrap();
//!
//! let mut out = vec![0u8; buf.get_size() as usize];
//! buf.read(0, &mut out, 0, buf.get_size()).unwrap();
//! assert_eq!(&out, b"helloh world" as &[u8]);
//! ```
//!
//! # The hard part
//!
//! Two subsystems carry nearly all of the design weight: the [`segcol`]
//! piece table (insert/delete that splits and stitches immutable segments),
//! and the [`planner`] save algorithm, which builds an overlap graph of
//! segment-to-file-region dependencies, breaks cycles by spilling the
//! minimum amount of overlapped data to a side store, and writes the rest in
//! a dependency-safe order.
//!
//! # Errors
//!
//! Every fallible operation returns [`Result<T>`](error::Result), whose
//! [`Error`] reuses the host's errno space (`EINVAL`, `EOVERFLOW`, `EBADF`,
//! `ENOSPC`, `ENOMEM`, `EIO`) where the meaning matches, and reserves
//! negative codes for library-specific conditions. A failed mutation leaves
//! the buffer exactly as it was before the call.
//!
//! # Concurrency
//!
//! The core is single-owner and non-reentrant: at most one mutator may touch
//! a [`Buffer`] at a time, and readers must not concurrently observe a
//! mutation in progress. `save` performs synchronous, potentially blocking
//! I/O and is the only long-running operation; callers that need
//! responsiveness should run it on a dedicated thread.

#![deny(missing_docs)]

mod action;
mod buffer;
mod disjoint_set;
mod error;
mod options;
mod planner;
mod priority_queue;
mod raw;
mod segcol;
mod segment;
mod source;

pub use buffer::Buffer;
pub use error::{strerror, Error, ErrorCode, Result};
pub use options::{OptionKey, UndoAfterSave, UndoLimit};
pub use planner::{Direction, OverlapGraph, ProgressCallback};
pub use segcol::{Cursor, SegmentCollection};
pub use segment::{Segment, OFF_MAX};
pub use source::{AccessMode, DataSource, View};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_surface_is_usable_end_to_end() {
        let mut buf = Buffer::new();
        let src = DataSource::from_memory(b"0123456789".to_vec());
        buf.append(&src, 0, 10).unwrap();
        assert_eq!(buf.get_size(), 10);
        assert_eq!(buf.get_revision_id(), 1);
        assert_eq!(buf.get_save_revision_id(), 0);

        buf.undo().unwrap();
        assert_eq!(buf.get_size(), 0);
        assert!(!buf.can_undo());
    }
}
