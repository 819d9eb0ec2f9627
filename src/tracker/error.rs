use thiserror::Error;

/// Errors surfaced by the tracker and its file-backed components.
///
/// `Io` and `CheckpointInconsistent` are fatal to the server process; the
/// last good checkpoint guarantees restartability. `UnknownWorkId` is a
/// client protocol error and leaves tracker state untouched.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint inconsistent: {0}")]
    CheckpointInconsistent(String),

    #[error("work id {0} was never issued")]
    UnknownWorkId(u64),
}
