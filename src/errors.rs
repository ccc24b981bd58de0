// src/errors.rs  —  One error taxonomy for every public operation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds reported by the library.
///
/// Every public operation returns `Result<T, Error>`; internal callbacks
/// never raise — they either succeed, are skipped, or are logged.
#[derive(Debug, Error)]
pub enum Error {
    /// Parameter out of range, unknown character, malformed representation.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Operation requires a state the component is not in
    /// (e.g. a started generator, or an attached key).
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Tone queue at capacity; the enqueue did not mutate the queue.
    #[error("tone queue full")]
    FullQueue,

    /// Receive data not complete yet — poll again later.
    #[error("not ready, poll again")]
    Again,

    /// Receiver has no character or space pending at all.
    #[error("nothing pending")]
    NothingPending,

    /// The receive buffer holds a dot/dash string with no character mapping.
    #[error("no character for representation {0:?}")]
    UnknownRepresentation(String),

    /// The requested sound system cannot be opened; the caller may retry
    /// with a different backend.
    #[error("sound backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A sink write failed or was short.  The generator consumer logs this
    /// and advances to the next tone.
    #[error("sink i/o failure: {0}")]
    IoFailure(String),

    /// A blocking wait was interrupted by shutdown.
    #[error("wait cancelled by shutdown")]
    Cancelled,
}
