//! Unix file-descriptor primitives used by data sources and the save planner.
//!
//! Mirrors the teacher's `ffi` submodule pattern: each function is a thin,
//! `unsafe`, `Result`-returning wrapper around one libc call, translating a
//! `-1` return into `io::Error::last_os_error()`.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Identity of the file backing a `File` data source, used by
/// [`crate::source::DataSource::compare`] to decide whether two sources
/// refer to the same underlying file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
}

/// Opens `path` for reading, returning the raw file descriptor.
pub fn open_read(path: &Path) -> io::Result<libc::c_int> {
    let path = cstr(path)?;
    // SAFETY: `path` is a valid, null-terminated C string for the lifetime of
    // the call.
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY) };
    if fd == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

/// Opens `path` for reading and writing, creating it with `mode` if absent.
pub fn open_readwrite(path: &Path, mode: libc::mode_t) -> io::Result<libc::c_int> {
    let path = cstr(path)?;
    // SAFETY: `path` is a valid, null-terminated C string for the lifetime of
    // the call; `mode` is only consulted when `O_CREAT` creates a new file.
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_CREAT, mode) };
    if fd == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

/// Creates a uniquely named, `0600`-mode temporary file under `dir` with the
/// `bless-spill-XXXXXX` pattern, returning its descriptor and path.
///
/// The file is created via `mkstemp`, which fills in the `XXXXXX`
/// placeholder atomically; unlike `open_readwrite` there is no TOCTOU window
/// where another process could race the creation.
pub fn mkstemp(dir: &Path) -> io::Result<(libc::c_int, std::path::PathBuf)> {
    let template_path = dir.join("bless-spill-XXXXXX");
    let mut template = cstr(&template_path)?.into_bytes_with_nul();

    // SAFETY: `template` is a mutable, null-terminated buffer with six
    // trailing `X` bytes as required by `mkstemp`, which rewrites them in
    // place with a unique suffix and returns an already-open descriptor.
    let fd = unsafe { libc::mkstemp(template.as_mut_ptr() as *mut libc::c_char) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }

    // mkstemp rewrote the placeholder in `template`; strip the trailing NUL.
    template.pop();
    let path = std::path::PathBuf::from(std::ffi::OsStr::from_bytes(&template));

    Ok((fd, path))
}

/// Unlinks the file at `path`. Used right after creating a spill temp file so
/// it disappears from the directory but remains accessible through the open
/// descriptor until the last reference drops.
pub fn unlink(path: &Path) -> io::Result<()> {
    let path = cstr(path)?;
    // SAFETY: `path` is a valid, null-terminated C string.
    if unsafe { libc::unlink(path.as_ptr()) } == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Closes `fd`.
pub fn close(fd: libc::c_int) -> io::Result<()> {
    // SAFETY: caller guarantees `fd` is open and not used afterwards.
    if unsafe { libc::close(fd) } == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Returns the length of the open file `fd`, via `fstat`.
pub fn file_len(fd: libc::c_int) -> io::Result<u64> {
    stat(fd).map(|st| st.st_size as u64)
}

/// Returns the `(device, inode)` identity of the open file `fd`.
#[allow(clippy::unnecessary_cast)] // st_dev/st_ino widths vary across libc targets
pub fn identity(fd: libc::c_int) -> io::Result<FileIdentity> {
    stat(fd).map(|st| FileIdentity {
        dev: st.st_dev as u64,
        ino: st.st_ino as u64,
    })
}

fn stat(fd: libc::c_int) -> io::Result<libc::stat> {
    // SAFETY: `st` is zero-initialized and `fstat` fully populates it on
    // success; on failure we propagate the error without reading `st`.
    unsafe {
        let mut st: libc::stat = std::mem::zeroed();
        if libc::fstat(fd, &mut st) == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(st)
        }
    }
}

/// Reads exactly `buf.len()` bytes from `fd` at offset `at` into `buf`,
/// looping over short reads the way `pread` allows.
pub fn pread_exact(fd: libc::c_int, buf: &mut [u8], at: u64) -> io::Result<()> {
    let mut done = 0usize;
    while done < buf.len() {
        // SAFETY: `buf[done..]` is a valid, writable region of the requested
        // length; `fd` is caller-owned and open for reading.
        let n = unsafe {
            libc::pread(
                fd,
                buf[done..].as_mut_ptr() as *mut libc::c_void,
                buf.len() - done,
                (at + done as u64) as libc::off_t,
            )
        };
        if n == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read past end of file",
            ));
        }
        done += n as usize;
    }
    Ok(())
}

/// Writes all of `buf` to `fd` at offset `at`, looping over short writes.
pub fn pwrite_all(fd: libc::c_int, buf: &[u8], at: u64) -> io::Result<()> {
    let mut done = 0usize;
    while done < buf.len() {
        // SAFETY: `buf[done..]` is a valid, readable region of the requested
        // length; `fd` is caller-owned and open for writing.
        let n = unsafe {
            libc::pwrite(
                fd,
                buf[done..].as_ptr() as *const libc::c_void,
                buf.len() - done,
                (at + done as u64) as libc::off_t,
            )
        };
        if n == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        done += n as usize;
    }
    Ok(())
}

/// Truncates (or extends) `fd` to exactly `len` bytes.
pub fn ftruncate(fd: libc::c_int, len: u64) -> io::Result<()> {
    // SAFETY: `fd` is caller-owned and open for writing.
    if unsafe { libc::ftruncate(fd, len as libc::off_t) } == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn cstr(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mkstemp_creates_unique_unlinkable_file() {
        let dir = std::env::temp_dir();
        let (fd, path) = mkstemp(&dir).unwrap();
        assert!(path.exists());
        pwrite_all(fd, b"hello", 0).unwrap();
        unlink(&path).unwrap();
        assert!(!path.exists());

        let mut buf = [0u8; 5];
        pread_exact(fd, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"hello");
        close(fd).unwrap();
    }

    #[test]
    fn pread_pwrite_roundtrip() {
        let dir = std::env::temp_dir();
        let (fd, path) = mkstemp(&dir).unwrap();
        pwrite_all(fd, b"0123456789", 0).unwrap();
        let mut buf = [0u8; 4];
        pread_exact(fd, &mut buf, 3).unwrap();
        assert_eq!(&buf, b"3456");
        unlink(&path).unwrap();
        close(fd).unwrap();
    }

    #[test]
    fn file_len_and_identity() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"abcdef").unwrap();
        f.flush().unwrap();
        let fd = open_read(f.path()).unwrap();
        assert_eq!(file_len(fd).unwrap(), 6);
        let id1 = identity(fd).unwrap();
        let fd2 = open_read(f.path()).unwrap();
        let id2 = identity(fd2).unwrap();
        assert_eq!(id1, id2);
        close(fd).unwrap();
        close(fd2).unwrap();
    }
}
