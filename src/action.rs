//! The undo/redo action log: inverse records for primitive mutations, grouped
//! into atomic multi-actions, retained up to a configurable limit.

use crate::error::{Error, Result};
use crate::options::UndoLimit;
use crate::segcol::SegmentCollection;

/// An inverse record for one primitive mutation, or a group of them applied
/// atomically.
pub enum Action {
    /// Undoes an insert/append: the logical range to delete.
    InsertInverse { off: u64, len: u64 },
    /// Undoes a delete: the removed segments, to be re-inserted at `off`.
    DeleteInverse {
        off: u64,
        collection: SegmentCollection,
    },
    /// A group of sub-actions applied as one atomic undo/redo unit, in the
    /// order they were originally performed.
    Multi(Vec<Action>),
}

impl Action {
    /// Number of primitive mutations this action represents, for `rev_id`
    /// bookkeeping (§3: a multi increments `rev_id` by its sub-action count).
    pub fn primitive_count(&self) -> u64 {
        match self {
            Action::InsertInverse { .. } | Action::DeleteInverse { .. } => 1,
            Action::Multi(actions) => actions.iter().map(Action::primitive_count).sum(),
        }
    }

    /// Applies this action to `segcol` as an inverse of whatever mutation it
    /// records, returning the action that would undo *this* application (so
    /// the caller can push it onto the opposite stack).
    ///
    /// On failure, also returns whatever prefix of a `Multi` group was
    /// already applied before the failing sub-step, as the partially-
    /// inverted group the caller should push back onto the stack the
    /// original action came from (`None` if nothing was applied yet).
    #[allow(clippy::type_complexity)]
    fn apply(self, segcol: &mut SegmentCollection) -> std::result::Result<Action, (Error, Option<Box<Action>>)> {
        match self {
            Action::InsertInverse { off, len } => {
                let collection = segcol.delete(off, len).map_err(|e| (e, None))?;
                Ok(Action::DeleteInverse { off, collection })
            }
            Action::DeleteInverse { off, collection } => {
                let len = collection.size();
                segcol.splice_in(off, collection).map_err(|e| (e, None))?;
                Ok(Action::InsertInverse { off, len })
            }
            Action::Multi(actions) => {
                // `actions` is in the chronological order its sub-mutations
                // were originally recorded; applying it (to undo, or to redo
                // a previously-undone group) must run through it back to
                // front, most-recent sub-mutation first. The produced list
                // is collected in that same (reverse) traversal order, which
                // is exactly what the *next* application of this group needs
                // to walk backwards again to replay correctly — so it is
                // stored as-is, not re-reversed.
                let mut produced = Vec::with_capacity(actions.len());
                for sub in actions.into_iter().rev() {
                    match sub.apply(segcol) {
                        Ok(inverse) => produced.push(inverse),
                        Err((err, nested_partial)) => {
                            produced.extend(nested_partial.map(|b| *b));
                            let partial = (!produced.is_empty()).then(|| Box::new(Action::Multi(produced)));
                            return Err((err, partial));
                        }
                    }
                }
                Ok(Action::Multi(produced))
            }
        }
    }
}

/// Two stacks (undo, redo) of [`Action`]s, a retention cap, and a
/// multi-action nesting depth counter.
pub struct ActionLog {
    undo: Vec<Action>,
    redo: Vec<Action>,
    limit: UndoLimit,
    /// Sub-actions accumulated for each currently-open multi-action, indexed
    /// by nesting depth (innermost last).
    open_multis: Vec<Vec<Action>>,
}

impl ActionLog {
    /// Creates an empty log with the given retention limit.
    pub fn new(limit: UndoLimit) -> Self {
        ActionLog {
            undo: Vec::new(),
            redo: Vec::new(),
            limit,
            open_multis: Vec::new(),
        }
    }

    /// Current multi-action nesting depth (0 if none open).
    pub fn query_multi(&self) -> usize {
        self.open_multis.len()
    }

    /// Opens a (possibly nested) multi-action; subsequent `record` calls
    /// accumulate into it instead of the undo stack.
    pub fn begin_multi(&mut self) {
        self.open_multis.push(Vec::new());
    }

    /// Closes the innermost open multi-action. If this was the outermost
    /// one, the accumulated sub-actions are finalized and pushed as a single
    /// undo entry (unless the group is empty, in which case nothing is
    /// pushed). `EINVAL` if no multi-action is open.
    pub fn end_multi(&mut self) -> Result<()> {
        let actions = self
            .open_multis
            .pop()
            .ok_or(Error::Invalid("end_multi without a matching begin_multi"))?;

        if actions.is_empty() {
            return Ok(());
        }

        match self.open_multis.last_mut() {
            Some(parent) => parent.push(Action::Multi(actions)),
            None => self.push_undo(Action::Multi(actions)),
        }
        Ok(())
    }

    /// Records a performed mutation's inverse. If a multi-action is open,
    /// accumulates into it; otherwise clears the redo stack and pushes onto
    /// the undo stack, trimming to the retention limit.
    pub fn record(&mut self, action: Action) {
        if let Some(open) = self.open_multis.last_mut() {
            open.push(action);
            return;
        }
        self.push_undo(action);
    }

    fn push_undo(&mut self, action: Action) {
        self.redo.clear();
        match self.limit {
            UndoLimit::Bounded(0) => {}
            _ => {
                self.undo.push(action);
                self.trim();
            }
        }
    }

    fn trim(&mut self) {
        if let UndoLimit::Bounded(cap) = self.limit {
            let cap = cap as usize;
            if self.undo.len() > cap {
                let excess = self.undo.len() - cap;
                self.undo.drain(0..excess);
            }
        }
    }

    /// Changes the retention limit, trimming existing entries immediately.
    /// Per §9 Open Questions, trimming while a multi-action is open is
    /// deferred to the outer `end_multi` (the new limit only takes effect
    /// against completed outer actions).
    pub fn set_limit(&mut self, limit: UndoLimit) {
        self.limit = limit;
        if self.open_multis.is_empty() {
            if let UndoLimit::Bounded(0) = limit {
                self.undo.clear();
            } else {
                self.trim();
            }
        }
    }

    /// `true` if there is an action to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// `true` if there is an action to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Pops the most recent undo entry, applies it to `segcol`, and pushes
    /// its inverse onto the redo stack. Returns the number of primitive
    /// mutations undone (for `rev_id` bookkeeping).
    pub fn undo(&mut self, segcol: &mut SegmentCollection) -> Result<u64> {
        let action = self.undo.pop().ok_or(Error::Invalid("nothing to undo"))?;
        let count = action.primitive_count();
        match action.apply(segcol) {
            Ok(inverse) => {
                self.redo.push(inverse);
                Ok(count)
            }
            Err((err, partial)) => {
                // §4.3: whatever prefix of a multi-action already applied is
                // pushed back onto the stack the action was popped from,
                // rather than lost, so the entry is still visible to undo.
                if let Some(partial) = partial {
                    self.undo.push(*partial);
                }
                Err(err)
            }
        }
    }

    /// Pops the most recent redo entry, applies it to `segcol`, and pushes
    /// its inverse back onto the undo stack (bypassing the retention limit,
    /// since it was already counted once). Returns the number of primitive
    /// mutations redone.
    pub fn redo(&mut self, segcol: &mut SegmentCollection) -> Result<u64> {
        let action = self.redo.pop().ok_or(Error::Invalid("nothing to redo"))?;
        let count = action.primitive_count();
        match action.apply(segcol) {
            Ok(inverse) => {
                self.undo.push(inverse);
                Ok(count)
            }
            Err((err, partial)) => {
                if let Some(partial) = partial {
                    self.redo.push(*partial);
                }
                Err(err)
            }
        }
    }

    /// Clears both stacks without touching `segcol` (used after a save when
    /// `UNDO_AFTER_SAVE == "never"`).
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DataSource;

    fn seg(bytes: &[u8]) -> crate::segment::Segment {
        crate::segment::Segment::new(DataSource::from_memory(bytes.to_vec()), 0, bytes.len() as u64)
            .unwrap()
    }

    fn contents(sc: &SegmentCollection) -> Vec<u8> {
        let mut out = Vec::new();
        let mut cur = sc.iter();
        while cur.is_valid() {
            let s = cur.get_segment();
            let mut buf = vec![0u8; s.length() as usize];
            s.read_into(&mut buf).unwrap();
            out.extend(buf);
            cur.next();
        }
        out
    }

    #[test]
    fn undo_insert_then_redo() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"0123456789")).unwrap();
        let mut log = ActionLog::new(UndoLimit::Infinite);

        sc.insert(4, seg(b"abc")).unwrap();
        log.record(Action::InsertInverse { off: 4, len: 3 });
        assert_eq!(contents(&sc), b"0123abc456789");

        log.undo(&mut sc).unwrap();
        assert_eq!(contents(&sc), b"0123456789");
        assert!(log.can_redo());

        log.redo(&mut sc).unwrap();
        assert_eq!(contents(&sc), b"0123abc456789");
    }

    #[test]
    fn undo_delete_then_redo() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"0123456789")).unwrap();
        let mut log = ActionLog::new(UndoLimit::Infinite);

        let deleted = sc.delete(3, 4).unwrap();
        log.record(Action::DeleteInverse { off: 3, collection: deleted });
        assert_eq!(contents(&sc), b"012789");

        log.undo(&mut sc).unwrap();
        assert_eq!(contents(&sc), b"0123456789");

        log.redo(&mut sc).unwrap();
        assert_eq!(contents(&sc), b"012789");
    }

    #[test]
    fn record_clears_redo_stack() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"0123456789")).unwrap();
        let mut log = ActionLog::new(UndoLimit::Infinite);

        sc.insert(4, seg(b"abc")).unwrap();
        log.record(Action::InsertInverse { off: 4, len: 3 });
        log.undo(&mut sc).unwrap();
        assert!(log.can_redo());

        sc.append(seg(b"xyz")).unwrap();
        log.record(Action::InsertInverse { off: sc.size() - 3, len: 3 });
        assert!(!log.can_redo());
    }

    #[test]
    fn zero_limit_disables_retention() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"abc")).unwrap();
        let mut log = ActionLog::new(UndoLimit::Bounded(0));

        sc.append(seg(b"def")).unwrap();
        log.record(Action::InsertInverse { off: 3, len: 3 });
        assert!(!log.can_undo());
        assert_eq!(contents(&sc), b"abcdef");
    }

    #[test]
    fn bounded_limit_drops_oldest() {
        let mut sc = SegmentCollection::new();
        let mut log = ActionLog::new(UndoLimit::Bounded(2));

        for _ in 0..3 {
            let before = sc.size();
            sc.append(seg(b"x")).unwrap();
            log.record(Action::InsertInverse { off: before, len: 1 });
        }
        // Only the last 2 of 3 appends are retained.
        log.undo(&mut sc).unwrap();
        log.undo(&mut sc).unwrap();
        assert!(!log.can_undo());
        assert_eq!(sc.size(), 1);
    }

    #[test]
    fn multi_action_undoes_as_one_unit() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"0123456789")).unwrap();
        let mut log = ActionLog::new(UndoLimit::Infinite);

        log.begin_multi();
        sc.insert(5, seg(b"abc")).unwrap();
        log.record(Action::InsertInverse { off: 5, len: 3 });
        let deleted = sc.delete(0, 2).unwrap();
        log.record(Action::DeleteInverse { off: 0, collection: deleted });
        log.end_multi().unwrap();

        assert_eq!(contents(&sc), b"234abc56789");
        assert_eq!(log.query_multi(), 0);

        log.undo(&mut sc).unwrap();
        assert_eq!(contents(&sc), b"0123456789");

        log.redo(&mut sc).unwrap();
        assert_eq!(contents(&sc), b"234abc56789");
    }

    #[test]
    fn multi_undo_partial_failure_pushes_partial_back_to_undo_stack() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"0123456789")).unwrap();
        let mut log = ActionLog::new(UndoLimit::Infinite);

        let mut removed = SegmentCollection::new();
        removed.append(seg(b"X")).unwrap();

        // Processed in reverse: the `DeleteInverse` runs first and succeeds
        // (splicing "X" back in at the front), then the `InsertInverse`
        // runs against the now-11-byte collection and fails, since offset 20
        // is out of range.
        let multi = Action::Multi(vec![
            Action::InsertInverse { off: 20, len: 1 },
            Action::DeleteInverse { off: 0, collection: removed },
        ]);
        log.record(multi);

        assert!(log.undo(&mut sc).is_err());
        assert_eq!(contents(&sc), b"X0123456789");

        // The already-applied prefix was pushed back onto the undo stack
        // instead of being dropped, so it can still be undone.
        assert!(log.can_undo());
        log.undo(&mut sc).unwrap();
        assert_eq!(contents(&sc), b"0123456789");
    }

    #[test]
    fn unpaired_end_multi_is_invalid() {
        let mut log: ActionLog = ActionLog::new(UndoLimit::Infinite);
        assert!(log.end_multi().is_err());
    }

    #[test]
    fn empty_multi_action_pushes_nothing() {
        let mut log: ActionLog = ActionLog::new(UndoLimit::Infinite);
        log.begin_multi();
        log.end_multi().unwrap();
        assert!(!log.can_undo());
    }
}
