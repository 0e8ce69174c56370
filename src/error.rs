//! Error taxonomy shared by every fallible operation in the crate.

use std::fmt;
use std::io;

use thiserror::Error;

/// Reserved negative, library-specific error code for "not implemented".
pub const ENOTIMPLEMENTED: i32 = -1;

/// Errors produced by the edit buffer core.
///
/// Every variant maps to an errno-space code via [`Error::code`], reusing the
/// platform's codes where the meaning matches (argument errors, overflow,
/// resource errors) and reserving negative values for library-specific
/// conditions.
#[derive(Error, Debug)]
pub enum Error {
    /// Argument error: out-of-range offsets, inverted ranges, unknown option
    /// keys, malformed option values, an unpaired `end_multi`.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),

    /// Arithmetic that would exceed `OFF_MAX` or `SIZE_MAX`. Checked before
    /// argument validation so it is a distinct diagnosis.
    #[error("operation would overflow the offset type")]
    Overflow,

    /// Resource or OS-level error, surfaced verbatim from the platform layer.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// Reserved for future growth; currently the only library-specific
    /// condition.
    #[error("not implemented")]
    NotImplemented,
}

impl Error {
    /// Returns the errno-space code for this error, as described in §6/§7 of
    /// the specification: positive platform codes for argument, overflow and
    /// resource errors, negative codes reserved for library-specific ones.
    pub fn code(&self) -> i32 {
        match self {
            Error::Invalid(_) => libc::EINVAL,
            Error::Overflow => libc::EOVERFLOW,
            Error::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Error::NotImplemented => ENOTIMPLEMENTED,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns a human readable description of an errno-space `code`.
///
/// Positive codes are described using the platform's `strerror`; negative,
/// library-specific codes use a built-in table.
pub fn strerror(code: i32) -> String {
    if code < 0 {
        match code {
            ENOTIMPLEMENTED => "Not implemented".to_string(),
            _ => "Unknown library-specific error".to_string(),
        }
    } else {
        // SAFETY: `strerror` always returns a valid, null-terminated pointer
        // for any `c_int`, even for unrecognized codes (it falls back to an
        // "Unknown error" message owned by libc).
        unsafe {
            let ptr = libc::strerror(code);
            std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", strerror(self.0))
    }
}

/// Thin wrapper so an errno-space code can be displayed/propagated on its
/// own, without an accompanying [`Error`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub i32);
