//! The buffer façade: the public surface tying together the segment
//! collection, the action log, options and revision bookkeeping.

use std::path::Path;

use tracing::{debug, instrument};

use crate::action::{Action, ActionLog};
use crate::error::{Error, Result};
use crate::options::{OptionStore, UndoAfterSave, UndoLimit};
use crate::planner::{self, ProgressCallback};
use crate::segcol::SegmentCollection;
use crate::segment::Segment;
use crate::source::DataSource;

/// An in-progress edit of a potentially very large binary object: a sequence
/// of references to immutable data sources, with undo/redo and a safe
/// in-place save.
pub struct Buffer {
    segcol: SegmentCollection,
    log: ActionLog,
    options: OptionStore,
    rev_id: u64,
    save_rev_id: u64,
}

impl Buffer {
    /// Creates a new, empty buffer with default options.
    pub fn new() -> Self {
        let options = OptionStore::new();
        let log = ActionLog::new(options.undo_limit());
        Buffer {
            segcol: SegmentCollection::new(),
            log,
            options,
            rev_id: 0,
            save_rev_id: 0,
        }
    }

    /// Total size of the buffer's logical content, in bytes.
    pub fn get_size(&self) -> u64 {
        self.segcol.size()
    }

    /// Appends `[off, off+len)` of `src` to the end of the buffer.
    #[instrument(skip(self, src))]
    pub fn append(&mut self, src: &DataSource, off: u64, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let at = self.segcol.size();
        let seg = Segment::new(src.clone(), off, len)?;
        self.segcol.append(seg)?;
        self.log.record(Action::InsertInverse { off: at, len });
        self.rev_id += 1;
        debug!(at, len, "appended");
        Ok(())
    }

    /// Inserts `[off, off+len)` of `src` so its first byte lands at logical
    /// offset `at`. `at == get_size()` is `EINVAL`; use [`Buffer::append`].
    #[instrument(skip(self, src))]
    pub fn insert(&mut self, at: u64, src: &DataSource, off: u64, len: u64) -> Result<()> {
        if len == 0 {
            if at >= self.segcol.size() {
                return Err(Error::Invalid("insert offset outside buffer"));
            }
            return Ok(());
        }
        let seg = Segment::new(src.clone(), off, len)?;
        self.segcol.insert(at, seg)?;
        self.log.record(Action::InsertInverse { off: at, len });
        self.rev_id += 1;
        Ok(())
    }

    /// Deletes `[at, at+len)` from the buffer.
    #[instrument(skip(self))]
    pub fn delete(&mut self, at: u64, len: u64) -> Result<()> {
        if len == 0 {
            let end = at.checked_add(len).ok_or(Error::Overflow)?;
            if end > self.segcol.size() {
                return Err(Error::Invalid("delete range outside buffer"));
            }
            return Ok(());
        }
        let collection = self.segcol.delete(at, len)?;
        self.log.record(Action::DeleteInverse { off: at, collection });
        self.rev_id += 1;
        Ok(())
    }

    /// Reads `len` logical bytes starting at `at` into `dst[dst_off..]`.
    pub fn read(&self, at: u64, dst: &mut [u8], dst_off: u64, len: u64) -> Result<()> {
        let dst_end = dst_off.checked_add(len).ok_or(Error::Overflow)?;
        if dst_end > dst.len() as u64 {
            return Err(Error::Invalid("destination too small for read"));
        }
        let end = at.checked_add(len).ok_or(Error::Overflow)?;
        if end > self.segcol.size() {
            return Err(Error::Invalid("read range outside buffer"));
        }
        if len == 0 {
            return Ok(());
        }

        let mut cur = self.segcol.find(at)?;
        let mut remaining = len;
        let mut src_off = at - cur.get_mapping();
        let mut out = dst_off;

        while remaining > 0 {
            let seg = cur.get_segment();
            let avail = seg.length() - src_off;
            let take = remaining.min(avail);
            let mut buf = vec![0u8; take as usize];
            seg.read_range_into(src_off, &mut buf)?;
            dst[out as usize..(out + take) as usize].copy_from_slice(&buf);

            remaining -= take;
            out += take;
            src_off = 0;
            if remaining > 0 {
                cur.next();
            }
        }
        Ok(())
    }

    /// Rewrites `target_fd` so it holds exactly the buffer's content,
    /// correctly ordering writes when the target is itself referenced by
    /// segments in the buffer. See the save planner for the full algorithm.
    #[instrument(skip(self, progress))]
    pub fn save(&mut self, target_fd: libc::c_int, progress: Option<ProgressCallback>) -> Result<()> {
        let tmp_dir = Path::new(self.options.tmp_dir()).to_path_buf();
        let new_segcol = planner::save(
            &self.segcol,
            target_fd,
            &tmp_dir,
            planner::DEFAULT_INLINE_THRESHOLD,
            progress,
        )?;

        self.segcol = new_segcol;
        self.save_rev_id = self.rev_id;
        if self.options.undo_after_save() == UndoAfterSave::Never {
            self.log.clear();
        }
        debug!(save_rev_id = self.save_rev_id, "saved");
        Ok(())
    }

    /// Returns the string value of option `name`.
    pub fn get_option(&self, name: &str) -> Result<String> {
        self.options.get_option(name)
    }

    /// Validates and sets option `name` to `value`.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        self.options.set_option(name, value)?;
        if name == "UNDO_LIMIT" {
            self.log.set_limit(self.options.undo_limit());
        }
        Ok(())
    }

    /// Current revision id.
    pub fn get_revision_id(&self) -> u64 {
        self.rev_id
    }

    /// Revision id at the last successful save.
    pub fn get_save_revision_id(&self) -> u64 {
        self.save_rev_id
    }

    /// `true` if there is an action to undo.
    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    /// `true` if there is an action to redo.
    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    /// Undoes the most recent action, restoring `rev_id` to the value it had
    /// immediately before that action was originally performed.
    pub fn undo(&mut self) -> Result<()> {
        let count = self.log.undo(&mut self.segcol)?;
        self.rev_id -= count;
        Ok(())
    }

    /// Redoes the most recently undone action, restoring `rev_id` to the
    /// value it had immediately after that action was originally performed.
    pub fn redo(&mut self) -> Result<()> {
        let count = self.log.redo(&mut self.segcol)?;
        self.rev_id += count;
        Ok(())
    }

    /// Opens a (possibly nested) multi-action grouping subsequent mutations
    /// into one atomic undo/redo unit.
    pub fn begin_multi_action(&mut self) {
        self.log.begin_multi();
    }

    /// Closes the innermost open multi-action.
    pub fn end_multi_action(&mut self) -> Result<()> {
        self.log.end_multi()
    }

    /// Current multi-action nesting depth.
    pub fn query_multi_action(&self) -> usize {
        self.log.query_multi()
    }

    /// Changes the undo retention limit directly (equivalent to
    /// `set_option("UNDO_LIMIT", ...)`, exposed for callers that already hold
    /// a parsed [`UndoLimit`]).
    pub fn set_undo_limit(&mut self, limit: UndoLimit) {
        self.log.set_limit(limit);
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}
