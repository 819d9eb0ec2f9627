use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One input row handed to a worker: the zero-based line number and the raw
/// line content with the trailing newline stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub work_id: u64,
    pub row_content: String,
}

/// Construction parameters for the tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Input file, one record per line.
    pub infile: PathBuf,
    /// Output file; line `i` holds the result for input line `i`.
    pub outfile: PathBuf,
    /// Checkpoint file path.
    pub checkpoint: PathBuf,
    /// How long issued work may stay unanswered before it is re-issued.
    pub work_timeout: Duration,
    /// Minimum time between periodic checkpoint writes.
    pub checkpoint_interval: Duration,
}

/// Point-in-time snapshot of the tracker's counters, served by `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStatus {
    /// Highest work id whose result has been written to the output file,
    /// `-1` before any write.
    pub last_processed_work_id: i64,
    /// Next line number the input reader will assign.
    pub next_work_id: u64,
    /// Rows currently held by workers.
    pub issued: usize,
    /// Results buffered because an earlier row is still outstanding.
    pub pending_write: usize,
    /// Heap entries, including stale ones awaiting lazy deletion.
    pub heap_size: usize,
    pub expired_reissues: u64,
    pub duplicates_discarded: u64,
    /// Whether the input file is exhausted at this instant. New bytes
    /// appended to the file flip this back to false.
    pub input_eof: bool,
}
