//! Data Tracker Module
//!
//! This module implements the dispatcher's work-tracking state machine and the
//! file-backed components it coordinates.
//!
//! ## Architecture Overview
//! The tracker follows a **Pull-based** model with **reissue deadlines**:
//! 1. **Issuance**: `get_work_batch` hands out rows, expired issuances first,
//!    then fresh lines pulled from the input file on demand. Every issuance
//!    carries a deadline kept in a min-heap.
//! 2. **Completion**: results may arrive in any order and are buffered until
//!    they form a contiguous run starting right after the last written row.
//! 3. **Flush**: the contiguous run is appended to the output file in one
//!    write, so output line `i` always holds the result for input line `i`.
//! 4. **Checkpoint**: progress is snapshotted atomically at a fixed interval
//!    and on shutdown; a restart resumes from the snapshot (at-least-once
//!    delivery, exactly-once write).
//!
//! ## Submodules
//! - **`tracker`**: The state machine itself (issue, complete, flush,
//!   checkpoint, reconcile on startup).
//! - **`reader`**: Sequential line reader over the input file; owns the next
//!   work id and the input byte offset.
//! - **`writer`**: Append-only output writer; one combined write per
//!   contiguous run of results.
//! - **`checkpoint`**: Atomic write-temp-then-rename persistence of the
//!   progress record.
//! - **`types`**: Work items, configuration and status counters.
//! - **`error`**: The tracker error type.

pub mod checkpoint;
pub mod error;
pub mod reader;
pub mod tracker;
pub mod types;
pub mod writer;

#[cfg(test)]
mod tests;
