//! Error types for adtape.
//!
//! Only parameter requests are recoverable. Everything else in this enum
//! describes a broken tape and is raised through [`fatal`].

use thiserror::Error;

use crate::parameters::TapeParameter;

/// Result type alias using [`TapeError`].
pub type Result<T> = std::result::Result<T, TapeError>;

/// Errors reported by a tape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TapeError {
    /// A parameter name that no tape understands.
    #[error("unsupported tape parameter '{name}'")]
    UnsupportedParameter { name: String },

    /// The parameter can be read but not written.
    #[error("tape parameter {parameter:?} is read-only")]
    ReadOnlyParameter { parameter: TapeParameter },

    /// The parameter exists but this tape kind has no storage for it.
    #[error("tape parameter {parameter:?} is not available on this tape")]
    ParameterUnavailable { parameter: TapeParameter },

    /// Evaluation range with `start > end` or past the end of the tape.
    #[error("invalid evaluation range {start}..{end}")]
    InvalidRange { start: usize, end: usize },

    /// An external function token that was never registered, or was
    /// registered for a different real type.
    #[error("unknown external function token {token}")]
    UnknownToken { token: u32 },

    /// A byte segment was not written or read to exactly its reserved size.
    #[error("{segment} byte segment mismatch: expected {expected} bytes, got {actual}")]
    LayoutMismatch {
        segment: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A tape stream grew past what a `u32` position can address.
    #[error("{stream} stream exceeds {max} entries", max = u32::MAX)]
    CapacityExceeded { stream: &'static str },
}

/// Abort on a protocol error. The tape cannot be interpreted safely after
/// one of these, so there is nothing to recover to.
#[cold]
#[track_caller]
pub fn fatal(err: TapeError) -> ! {
    panic!("{err}")
}

/// Position `len` as a `u32` stream offset, fatal if it does not fit.
#[inline]
#[track_caller]
pub(crate) fn stream_position(len: usize, stream: &'static str) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| fatal(TapeError::CapacityExceeded { stream }))
}
