//! Data sources: reference-counted, immutable regions of bytes that segments
//! draw their content from.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::raw;

/// Access mode requested from [`DataSource::get_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Write-only access. Only memory sources support this; requesting it on
    /// a file source is `Error::Invalid`.
    Write,
    /// Simultaneous read/write access. Only memory sources support this.
    ReadWrite,
}

/// A view onto bytes produced by [`DataSource::get_data`].
///
/// For file sources the view owns a scratch copy read via `pread`; for
/// memory sources it borrows the underlying storage directly. Callers must
/// not retain a view across other operations on the buffer (§9, "iterator
/// invalidation" applies here too: a `View` is a borrowed snapshot).
pub enum View<'a> {
    /// Scratch copy fetched from a file source.
    Owned(Vec<u8>),
    /// Shared borrow of a memory source's storage.
    Borrowed(&'a [u8]),
    /// Exclusive borrow of a memory source's storage.
    BorrowedMut(&'a mut [u8]),
}

impl View<'_> {
    /// Returns the bytes as a read-only slice.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            View::Owned(v) => v.as_slice(),
            View::Borrowed(s) => s,
            View::BorrowedMut(s) => s,
        }
    }

    /// Returns the bytes as a mutable slice, if this view was acquired with
    /// write access.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self {
            View::Owned(v) => Some(v.as_mut_slice()),
            View::Borrowed(_) => None,
            View::BorrowedMut(s) => Some(s),
        }
    }
}

struct FileBacking {
    fd: libc::c_int,
    len: u64,
    identity: raw::FileIdentity,
    /// Kept only so `save` can recover the path for spill directory checks
    /// and diagnostics; not otherwise part of the source's identity.
    path: Option<PathBuf>,
}

impl Drop for FileBacking {
    fn drop(&mut self) {
        let _ = raw::close(self.fd);
    }
}

struct MemoryBacking {
    ptr: *mut u8,
    len: usize,
    free: Option<Box<dyn FnOnce(*mut u8, usize) + Send>>,
}

// SAFETY: `ptr` is treated as exclusively owned storage for the lifetime of
// the backing; the crate's single-owner, non-reentrant concurrency model
// (spec §5) means no two threads observe it concurrently.
unsafe impl Send for MemoryBacking {}
unsafe impl Sync for MemoryBacking {}

impl Drop for MemoryBacking {
    fn drop(&mut self) {
        if let Some(free) = self.free.take() {
            free(self.ptr, self.len);
        }
    }
}

enum Kind {
    File(Arc<FileBacking>),
    Memory(Arc<MemoryBacking>),
}

/// A reference-counted, immutable region of bytes: a file or a memory
/// region. Cheap to clone (clones an `Arc`).
#[derive(Clone)]
pub struct DataSource(Kind);

impl Clone for Kind {
    fn clone(&self) -> Self {
        match self {
            Kind::File(f) => Kind::File(Arc::clone(f)),
            Kind::Memory(m) => Kind::Memory(Arc::clone(m)),
        }
    }
}

impl DataSource {
    /// Opens `path` read-only as a file data source. The region is the whole
    /// file, with length cached at creation time (§3: lengths do not change
    /// after creation).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fd = raw::open_read(path)?;
        let len = match raw::file_len(fd) {
            Ok(len) => len,
            Err(err) => {
                let _ = raw::close(fd);
                return Err(err.into());
            }
        };
        let identity = match raw::identity(fd) {
            Ok(identity) => identity,
            Err(err) => {
                let _ = raw::close(fd);
                return Err(err.into());
            }
        };
        Ok(DataSource(Kind::File(Arc::new(FileBacking {
            fd,
            len,
            identity,
            path: Some(path.to_path_buf()),
        }))))
    }

    /// Wraps an already-owned buffer as a memory data source. The returned
    /// source owns `data`; it is freed (dropped) when the last reference is
    /// released.
    pub fn from_memory(mut data: Vec<u8>) -> Self {
        let len = data.len();
        let cap = data.capacity();
        let ptr = data.as_mut_ptr();
        std::mem::forget(data);
        DataSource(Kind::Memory(Arc::new(MemoryBacking {
            ptr,
            len,
            free: Some(Box::new(move |ptr, len| {
                // SAFETY: `ptr`/`len`/`cap` are exactly the allocation
                // `forget`'d above; `cap` (not `len`) is the allocated
                // capacity, which callers may have passed with spare room, so
                // reconstructing with `len` here would free with the wrong
                // layout. Reconstructing with `cap` lets the `Vec` drop
                // normally.
                unsafe {
                    drop(Vec::from_raw_parts(ptr, len, cap));
                }
            })),
        })))
    }

    /// Wraps an already-open, already-written file descriptor as a file data
    /// source of length `len`, taking ownership (closed on last unref).
    ///
    /// Used by the save planner for spill temp files, which are created and
    /// filled via [`crate::raw::mkstemp`]/`pwrite` and then unlinked, leaving
    /// the descriptor as the file's only handle.
    pub(crate) fn from_raw_fd(fd: libc::c_int, len: u64) -> Result<Self> {
        let identity = raw::identity(fd)?;
        Ok(DataSource(Kind::File(Arc::new(FileBacking {
            fd,
            len,
            identity,
            path: None,
        }))))
    }

    /// Wraps a foreign memory region as a data source.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads (and, if the region is ever accessed in
    /// [`AccessMode::Write`], writes) of `len` bytes for as long as any
    /// segment or view derived from the returned source is alive. If `free`
    /// is supplied it is called exactly once, with `(ptr, len)`, when the
    /// last reference to the source is dropped.
    pub unsafe fn from_memory_raw(
        ptr: *mut u8,
        len: usize,
        free: Option<Box<dyn FnOnce(*mut u8, usize) + Send>>,
    ) -> Self {
        DataSource(Kind::Memory(Arc::new(MemoryBacking { ptr, len, free })))
    }

    /// Total length of the source, in bytes.
    pub fn length(&self) -> u64 {
        match &self.0 {
            Kind::File(f) => f.len,
            Kind::Memory(m) => m.len as u64,
        }
    }

    /// Reads `buf.len()` bytes starting at `at` into `buf`.
    pub fn read_into(&self, buf: &mut [u8], at: u64) -> Result<()> {
        self.check_range(at, buf.len() as u64)?;
        match &self.0 {
            Kind::File(f) => raw::pread_exact(f.fd, buf, at).map_err(Error::from),
            Kind::Memory(m) => {
                // SAFETY: range was checked against `m.len` above; `m.ptr` is
                // valid for reads of `m.len` bytes per the backing's
                // constructor contract.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        m.ptr.add(at as usize),
                        buf.as_mut_ptr(),
                        buf.len(),
                    );
                }
                Ok(())
            }
        }
    }

    /// Acquires a view of `len` bytes at offset `at` in the given access
    /// mode. File sources only support [`AccessMode::Read`].
    pub fn get_data(&self, at: u64, len: u64, mode: AccessMode) -> Result<View<'_>> {
        self.check_range(at, len)?;
        match (&self.0, mode) {
            (Kind::File(f), AccessMode::Read) => {
                let mut buf = vec![0u8; len as usize];
                raw::pread_exact(f.fd, &mut buf, at)?;
                Ok(View::Owned(buf))
            }
            (Kind::File(_), _) => Err(Error::Invalid("file sources only support read access")),
            (Kind::Memory(m), AccessMode::Read) => {
                // SAFETY: range checked above.
                let slice =
                    unsafe { std::slice::from_raw_parts(m.ptr.add(at as usize), len as usize) };
                Ok(View::Borrowed(slice))
            }
            (Kind::Memory(m), AccessMode::Write | AccessMode::ReadWrite) => {
                // SAFETY: range checked above; the single-owner concurrency
                // model (spec §5) guarantees no other live view of this
                // range exists while this one is held.
                let slice = unsafe {
                    std::slice::from_raw_parts_mut(m.ptr.add(at as usize), len as usize)
                };
                Ok(View::BorrowedMut(slice))
            }
        }
    }

    /// Returns `true` iff `self` and `other` refer to the same underlying
    /// file (same device and inode) or the same memory region (same pointer
    /// and length). Used only by the save planner to detect whether a
    /// segment references the save target.
    pub fn compare(&self, other: &DataSource) -> bool {
        match (&self.0, &other.0) {
            (Kind::File(a), Kind::File(b)) => a.identity == b.identity,
            (Kind::Memory(a), Kind::Memory(b)) => a.ptr == b.ptr && a.len == b.len,
            _ => false,
        }
    }

    /// Returns `true` iff this source is a file source referring to the same
    /// file as the open descriptor `fd` (used by the save planner to decide
    /// whether segments reference the save target).
    pub fn matches_fd(&self, fd: libc::c_int) -> Result<bool> {
        match &self.0 {
            Kind::File(f) => Ok(f.identity == raw::identity(fd)?),
            Kind::Memory(_) => Ok(false),
        }
    }

    /// Path of the backing file, if this is a file source.
    pub fn path(&self) -> Option<&Path> {
        match &self.0 {
            Kind::File(f) => f.path.as_deref(),
            Kind::Memory(_) => None,
        }
    }

    fn check_range(&self, at: u64, len: u64) -> Result<()> {
        let end = at.checked_add(len).ok_or(Error::Overflow)?;
        if end > self.length() {
            return Err(Error::Invalid("range outside data source"));
        }
        Ok(())
    }
}
