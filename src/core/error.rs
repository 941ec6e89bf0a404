// This module defines the recoverable error types for rvjit using the thiserror crate.
// JitError covers the few failures that can legitimately happen at the boundary with the
// host: the emission buffer filling up (the driver may retry with a larger one), the
// kernel refusing to map or protect code pages, emission outside a begin/end session,
// and the object writer of the command line tool failing. Everything else the backend
// can get wrong (fields wider than their encoding, odd branch displacements, exhausted
// scratch registers, relocations never patched) is a caller bug and is reported by an
// assertion at the point of violation rather than through this type. JitResult<T> is
// the convenience alias used by fallible entry points.

//! Error types for the RISC-V JIT backend.

use thiserror::Error;

/// Recoverable errors reported by the emission session and the code buffer.
#[derive(Error, Debug)]
pub enum JitError {
    #[error("code buffer overflow: {needed} bytes emitted into a {capacity}-byte buffer")]
    BufferOverflow { needed: usize, capacity: usize },

    #[error("failed to map {size} bytes of code memory (errno {errno})")]
    MapFailed { size: usize, errno: i32 },

    #[error("failed to change code memory protection (errno {errno})")]
    Protect { errno: i32 },

    #[error("no emission session in progress")]
    NotStarted,

    #[error("object file generation failed: {0}")]
    ObjectWrite(String),
}

/// Result type alias for fallible JIT operations.
pub type JitResult<T> = Result<T, JitError>;

impl JitError {
    /// Build a mapping error from the current `errno`.
    pub(crate) fn map_failed(size: usize) -> Self {
        JitError::MapFailed {
            size,
            errno: last_errno(),
        }
    }

    /// Build a protection error from the current `errno`.
    pub(crate) fn protect() -> Self {
        JitError::Protect {
            errno: last_errno(),
        }
    }
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

impl From<object::write::Error> for JitError {
    fn from(err: object::write::Error) -> Self {
        JitError::ObjectWrite(err.to_string())
    }
}
