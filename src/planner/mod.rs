//! The save planner: computes a write order that preserves data-dependency
//! when the save target is itself referenced by segments in the buffer, then
//! executes it.
//!
//! This is the one genuinely subtle part of the crate (§4.5 of the design):
//! build an overlap graph of segment-to-target-region dependencies, break any
//! cycles by spilling the minimum amount of overlapped data into a side
//! store, then write everything in a safe order.

mod graph;

pub use graph::{Direction, OverlapGraph};
use graph::VertexRange;

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use crate::error::{Error, Result};
use crate::raw;
use crate::segcol::SegmentCollection;
use crate::segment::Segment;
use crate::source::DataSource;

/// Spill bytes smaller than this go to an in-memory data source; at or above
/// it, they go to a temp file under `TMP_DIR`. 64 KiB balances avoiding
/// temp-file churn for small overlaps against not holding large spills in
/// memory.
pub const DEFAULT_INLINE_THRESHOLD: u64 = 64 * 1024;

const COPY_CHUNK: usize = 64 * 1024;

/// A progress callback invoked periodically during `save` with
/// `(bytes_written, bytes_total)`; returning non-zero requests cancellation.
pub type ProgressCallback<'a> = &'a mut dyn FnMut(u64, u64) -> i32;

struct Item {
    segment: Segment,
    dest: u64,
    /// Self-overlap direction, computed before any spill, `None` if this
    /// vertex doesn't reference the target or has no self-overlap.
    direction: Option<Direction>,
}

/// Rewrites `target_fd` so it holds exactly `segcol`'s logical content,
/// handling the case where segments in `segcol` themselves reference
/// `target_fd`. On success, returns the segment collection to install as the
/// buffer's new live state: spilled segments now reference their side store,
/// and every other target-referencing segment is rebuilt against a source
/// over the rewritten file at its new (destination) offset, so reading the
/// live buffer afterwards still returns the correct content — the bytes it
/// used to read at their old `start` have moved to `dest`.
///
/// On any failure, `target_fd` is left in whatever state the attempt reached
/// (best-effort) and the caller's collection is untouched; allocated spill
/// resources are released before returning.
pub fn save(
    segcol: &SegmentCollection,
    target_fd: libc::c_int,
    tmp_dir: &Path,
    inline_threshold: u64,
    mut progress: Option<ProgressCallback>,
) -> Result<SegmentCollection> {
    let total = segcol.size();

    let mut items = Vec::new();
    let mut target_indices = Vec::new();
    let mut cur = segcol.iter();
    while cur.is_valid() {
        let segment = cur.get_segment().clone();
        let dest = cur.get_mapping();
        let is_target = segment.source().matches_fd(target_fd)?;
        if is_target {
            target_indices.push(items.len());
        }
        items.push(Item { segment, dest, direction: None });
        cur.next();
    }

    let vertices: Vec<VertexRange> = target_indices
        .iter()
        .map(|&i| VertexRange {
            source_start: items[i].segment.start(),
            dest_start: items[i].dest,
            len: items[i].segment.length(),
        })
        .collect();

    let graph = OverlapGraph::build(&vertices);
    let spill_local: HashSet<usize> = graph.spill_candidates(vertices.len()).into_iter().collect();

    for (local, &w) in graph.self_overlap.iter().enumerate() {
        if w > 0 && !spill_local.contains(&local) {
            let global = target_indices[local];
            let v = &vertices[local];
            items[global].direction = Some(Direction::of(v.dest_start, v.source_start));
        }
    }

    // Spill: read each spilled vertex's original target bytes into a side
    // store *before* any writes run, then redirect its segment to the spill
    // source. Spilled vertices are no longer target-referencing, so they
    // drop out of the dependency graph entirely.
    for &local in &spill_local {
        let global = target_indices[local];
        let seg = &items[global].segment;
        let len = seg.length();
        let start = seg.start();

        let spill = (|| -> Result<Segment> {
            let source = if len <= inline_threshold {
                let mut buf = vec![0u8; len as usize];
                raw::pread_exact(target_fd, &mut buf, start)?;
                DataSource::from_memory(buf)
            } else {
                // Large spills go through a bounded bounce buffer instead of
                // reading the whole overlap into memory at once, which is
                // the entire point of `inline_threshold` existing.
                let (fd, path) = raw::mkstemp(tmp_dir)?;
                let result = (|| -> Result<()> {
                    let mut chunk = vec![0u8; COPY_CHUNK.min(len as usize).max(1)];
                    let mut done = 0u64;
                    while done < len {
                        let n = (len - done).min(chunk.len() as u64) as usize;
                        raw::pread_exact(target_fd, &mut chunk[..n], start + done)?;
                        raw::pwrite_all(fd, &chunk[..n], done)?;
                        done += n as u64;
                    }
                    Ok(())
                })();
                // §6: spill temp files are unlinked immediately after
                // creation, living on only through the open descriptor.
                let _ = raw::unlink(&path);
                result?;
                DataSource::from_raw_fd(fd, len)?
            };
            Segment::new(source, 0, len)
        })();

        let seg = spill?;
        items[global].segment = seg;
        items[global].direction = None;
    }

    // Topologically order the remaining target vertices: edges whose
    // consumer (`from`) was spilled no longer constrain anything, since that
    // vertex now reads from its own private copy.
    let n = vertices.len();
    let mut indegree = vec![0usize; n];
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in &graph.edges {
        if spill_local.contains(&edge.from) {
            continue;
        }
        adj[edge.from].push(edge.to);
        indegree[edge.to] += 1;
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&v| indegree[v] == 0).collect();
    let mut topo_local = Vec::with_capacity(n);
    while let Some(v) = queue.pop_front() {
        topo_local.push(v);
        for &to in &adj[v] {
            indegree[to] -= 1;
            if indegree[to] == 0 {
                queue.push_back(to);
            }
        }
    }
    if topo_local.len() != n {
        return Err(Error::Invalid(
            "save planner: cycle remained after spill (internal invariant violation)",
        ));
    }

    // Execution order: target vertices in their topological order, threaded
    // through the full item list so non-target segments are written too
    // (their order relative to each other and to target vertices carries no
    // dependency, only target-vertex-to-target-vertex order matters).
    let mut order: Vec<usize> = topo_local.iter().map(|&v| target_indices[v]).collect();
    let ordered: HashSet<usize> = order.iter().copied().collect();
    for (i, _) in items.iter().enumerate() {
        if !ordered.contains(&i) {
            order.push(i);
        }
    }

    let mut written = 0u64;
    for &idx in &order {
        let item = &items[idx];
        write_item(item, target_fd)?;
        written += item.segment.length();
        if let Some(cb) = progress.as_deref_mut() {
            if cb(written, total) != 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "save cancelled by progress callback",
                )));
            }
        }
    }

    raw::ftruncate(target_fd, total)?;

    // Non-spilled target segments now live at `item.dest` in the rewritten
    // file, not at their old `start` — rebuild them against a source over
    // the post-save file so the live buffer keeps reading correct content.
    // Spilled segments already point at their side store and are left
    // alone; non-target segments never referenced the file and are
    // likewise left alone.
    let mut post_save_source: Option<DataSource> = None;
    for (local, &global) in target_indices.iter().enumerate() {
        if spill_local.contains(&local) {
            continue;
        }
        let source = match &post_save_source {
            Some(s) => s.clone(),
            None => {
                // SAFETY: `target_fd` is caller-owned and open; `dup` gives
                // this source its own descriptor so it can outlive the
                // caller's use of `target_fd`.
                let dup = unsafe { libc::dup(target_fd) };
                if dup < 0 {
                    return Err(Error::Io(std::io::Error::last_os_error()));
                }
                let s = DataSource::from_raw_fd(dup, total)?;
                post_save_source = Some(s.clone());
                s
            }
        };
        let dest = items[global].dest;
        let len = items[global].segment.length();
        items[global].segment = Segment::new(source, dest, len)?;
    }

    let mut result = SegmentCollection::new();
    for item in items {
        result.append(item.segment)?;
    }
    Ok(result)
}

fn write_item(item: &Item, target_fd: libc::c_int) -> Result<()> {
    let len = item.segment.length();
    if len == 0 {
        return Ok(());
    }
    match item.direction {
        Some(Direction::NoOp) => Ok(()),
        Some(Direction::Descending) => copy_chunked(&item.segment, target_fd, item.dest, true),
        _ => copy_chunked(&item.segment, target_fd, item.dest, false),
    }
}

/// Copies `segment`'s bytes to `target_fd` at `dest`, one bounce-buffer chunk
/// at a time. `reverse` processes chunks back-to-front, for segments whose
/// destination lies above their source within the same file (§4.5).
fn copy_chunked(segment: &Segment, target_fd: libc::c_int, dest: u64, reverse: bool) -> Result<()> {
    let len = segment.length();
    let mut buf = vec![0u8; COPY_CHUNK.min(len as usize).max(1)];

    if !reverse {
        let mut done = 0u64;
        while done < len {
            let n = (len - done).min(buf.len() as u64) as usize;
            segment.read_range_into(done, &mut buf[..n])?;
            raw::pwrite_all(target_fd, &buf[..n], dest + done)?;
            done += n as u64;
        }
    } else {
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(buf.len() as u64) as usize;
            remaining -= n as u64;
            segment.read_range_into(remaining, &mut buf[..n])?;
            raw::pwrite_all(target_fd, &buf[..n], dest + remaining)?;
        }
    }
    Ok(())
}
