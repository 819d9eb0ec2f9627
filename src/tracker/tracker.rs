use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use super::checkpoint::{CheckpointRecord, CheckpointStore};
use super::error::TrackerError;
use super::reader::InputReader;
use super::types::{TrackerConfig, TrackerStatus, WorkItem};
use super::writer::OutputWriter;

/// Retry hint returned when nothing is issued and the input is momentarily
/// exhausted.
const RETRY_DEFAULT_SECS: u64 = 5;
/// Cap on the heap-derived retry hint.
const RETRY_CAP_SECS: u64 = 60;

/// A row currently held by some worker, waiting for its result.
#[derive(Debug, Clone)]
struct Issued {
    expires_at: Instant,
    row_content: String,
}

/// Counts for one completion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub accepted: usize,
    pub discarded: usize,
}

/// The dispatcher's state machine.
///
/// Owns both file handles and every mutable container. All public
/// operations run under the caller's single mutex; none of them block
/// beyond strictly local file I/O (one line read from the input, one
/// combined write to the output).
///
/// Completed rows leave `issued` without touching the deadline heap, so the
/// heap accumulates **stale** entries. An entry is live only while its
/// `(work_id, expires_at)` pair matches `issued`; anything else is
/// discarded on pop and never trusted (lazy deletion).
#[derive(Debug)]
pub struct DataTracker {
    config: TrackerConfig,
    reader: InputReader,
    writer: OutputWriter,
    checkpoints: CheckpointStore,

    /// Highest work id whose result has been written out, `-1` before any.
    last_processed_work_id: i64,
    /// work_id -> (deadline, content) for rows held by workers.
    issued: HashMap<u64, Issued>,
    /// Min-heap of (deadline, work_id); may contain stale entries.
    issued_heap: BinaryHeap<Reverse<(Instant, u64)>>,
    /// Results that arrived out of order, keyed by work id.
    pending_write: HashMap<u64, String>,

    last_checkpoint_at: Instant,
    expired_reissues: u64,
    duplicates_discarded: u64,
}

impl DataTracker {
    /// Loads the checkpoint (if any), reconciles it against the files on
    /// disk and opens both handles at the recovered offsets.
    ///
    /// The checkpoint is conservative: results flushed after the last
    /// checkpoint are in the output file but not in the record. Each
    /// complete output line found past `output_offset` advances
    /// `last_processed_work_id` by one and skips one input line. A torn
    /// trailing fragment was never a complete output line and is dropped.
    pub fn open(config: TrackerConfig) -> Result<Self, TrackerError> {
        let checkpoints = CheckpointStore::new(&config.checkpoint);
        let mut writer = OutputWriter::open(&config.outfile)?;
        let input_len = std::fs::metadata(&config.infile)?.len();

        let (mut last_processed, input_offset, output_offset) = match checkpoints.load()? {
            Some(record) => {
                if record.input_offset > input_len {
                    return Err(TrackerError::CheckpointInconsistent(format!(
                        "checkpoint input offset {} is past the end of {} ({} bytes); the input file shrank",
                        record.input_offset,
                        config.infile.display(),
                        input_len
                    )));
                }
                if record.output_offset > writer.offset() {
                    return Err(TrackerError::CheckpointInconsistent(format!(
                        "checkpoint output offset {} is past the end of {} ({} bytes); the output file shrank",
                        record.output_offset,
                        config.outfile.display(),
                        writer.offset()
                    )));
                }
                (
                    record.last_processed_work_id,
                    record.input_offset,
                    record.output_offset,
                )
            }
            None => {
                if writer.offset() > 0 {
                    return Err(TrackerError::CheckpointInconsistent(format!(
                        "no usable checkpoint but {} already holds {} bytes; refusing to dispatch from row 0 again",
                        config.outfile.display(),
                        writer.offset()
                    )));
                }
                (-1, 0, 0)
            }
        };

        let mut reader =
            InputReader::open(&config.infile, input_offset, (last_processed + 1) as u64)?;

        let tail = writer.read_tail(output_offset)?;
        let mut complete_len = 0usize;
        let mut extra_lines = 0usize;
        for chunk in tail.split_inclusive(|&b| b == b'\n') {
            if chunk.ends_with(b"\n") {
                complete_len += chunk.len();
                extra_lines += 1;
            }
        }
        if complete_len < tail.len() {
            tracing::warn!(
                "Discarding {} bytes of torn trailing output in {}",
                tail.len() - complete_len,
                config.outfile.display()
            );
        }
        writer.truncate(output_offset + complete_len as u64)?;

        for _ in 0..extra_lines {
            if !reader.skip_line()? {
                return Err(TrackerError::CheckpointInconsistent(format!(
                    "{} holds more result lines than {} has input lines",
                    config.outfile.display(),
                    config.infile.display()
                )));
            }
            last_processed += 1;
        }
        if extra_lines > 0 {
            tracing::info!(
                "Recovered {} result lines written after the last checkpoint",
                extra_lines
            );
        }

        Ok(Self {
            config,
            reader,
            writer,
            checkpoints,
            last_processed_work_id: last_processed,
            issued: HashMap::new(),
            issued_heap: BinaryHeap::new(),
            pending_write: HashMap::new(),
            last_checkpoint_at: Instant::now(),
            expired_reissues: 0,
            duplicates_discarded: 0,
        })
    }

    /// Hands out up to `n` rows: expired issuances first (re-issued with a
    /// fresh deadline), then fresh lines pulled from the input in order.
    /// An empty batch means nothing is available right now.
    pub fn get_work_batch(&mut self, n: usize) -> Result<Vec<WorkItem>, TrackerError> {
        let now = Instant::now();
        let mut batch = Vec::new();

        while batch.len() < n {
            let Some(&Reverse((expires_at, work_id))) = self.issued_heap.peek() else {
                break;
            };
            match self.issued.get_mut(&work_id) {
                Some(entry) if entry.expires_at == expires_at => {
                    if expires_at > now {
                        break;
                    }
                    self.issued_heap.pop();
                    entry.expires_at = now + self.config.work_timeout;
                    self.issued_heap.push(Reverse((entry.expires_at, work_id)));
                    self.expired_reissues += 1;
                    tracing::debug!("Reissuing expired row {}", work_id);
                    batch.push(WorkItem {
                        work_id,
                        row_content: entry.row_content.clone(),
                    });
                }
                _ => {
                    // Stale entry: the row completed or got a newer deadline.
                    self.issued_heap.pop();
                }
            }
        }

        while batch.len() < n {
            let Some((work_id, row_content)) = self.reader.next_line()? else {
                break;
            };
            let expires_at = now + self.config.work_timeout;
            self.issued.insert(
                work_id,
                Issued {
                    expires_at,
                    row_content: row_content.clone(),
                },
            );
            self.issued_heap.push(Reverse((expires_at, work_id)));
            batch.push(WorkItem {
                work_id,
                row_content,
            });
        }

        Ok(batch)
    }

    /// Records a batch of results.
    ///
    /// A work id that was never issued at all rejects the whole batch
    /// before any state changes. Rows already flushed or already completed
    /// are discarded as duplicates and counted. Afterwards the contiguous
    /// prefix is flushed and a checkpoint is written if the interval has
    /// elapsed.
    pub fn complete_work_batch(
        &mut self,
        results: Vec<(u64, String)>,
    ) -> Result<CompletionOutcome, TrackerError> {
        if let Some(work_id) = results
            .iter()
            .map(|(work_id, _)| *work_id)
            .find(|&work_id| work_id >= self.reader.next_work_id())
        {
            return Err(TrackerError::UnknownWorkId(work_id));
        }

        let mut outcome = CompletionOutcome {
            accepted: 0,
            discarded: 0,
        };
        for (work_id, result) in results {
            if work_id as i64 <= self.last_processed_work_id
                || !self.issued.contains_key(&work_id)
            {
                tracing::warn!("Duplicate completion for row {}; discarding", work_id);
                self.duplicates_discarded += 1;
                outcome.discarded += 1;
                continue;
            }
            // The heap entry for this row goes stale and is dropped on pop.
            self.issued.remove(&work_id);
            self.pending_write.insert(work_id, result);
            outcome.accepted += 1;
        }

        self.flush()?;
        self.maybe_checkpoint()?;
        Ok(outcome)
    }

    /// True once the input file is exhausted and no row is issued or
    /// buffered. New bytes appended to the input make this false again.
    pub fn all_work_complete(&self) -> Result<bool, TrackerError> {
        Ok(self.reader.remaining_bytes()? == 0
            && self.issued.is_empty()
            && self.pending_write.is_empty())
    }

    /// Seconds a worker should wait before asking again: until the soonest
    /// issuance deadline when one exists, a small constant otherwise. A
    /// stale heap top only shortens the wait, which is harmless.
    pub fn retry_hint(&self) -> u64 {
        match self.issued_heap.peek() {
            Some(&Reverse((expires_at, _))) => expires_at
                .saturating_duration_since(Instant::now())
                .as_secs()
                .clamp(1, RETRY_CAP_SECS),
            None => RETRY_DEFAULT_SECS,
        }
    }

    /// Final flush and final checkpoint. File handles close on drop.
    pub fn close(&mut self) -> Result<(), TrackerError> {
        self.flush()?;
        self.write_checkpoint()?;
        tracing::info!(
            "Tracker closed at last_processed_work_id={}",
            self.last_processed_work_id
        );
        Ok(())
    }

    pub fn status(&self) -> Result<TrackerStatus, TrackerError> {
        Ok(TrackerStatus {
            last_processed_work_id: self.last_processed_work_id,
            next_work_id: self.reader.next_work_id(),
            issued: self.issued.len(),
            pending_write: self.pending_write.len(),
            heap_size: self.issued_heap.len(),
            expired_reissues: self.expired_reissues,
            duplicates_discarded: self.duplicates_discarded,
            input_eof: self.reader.remaining_bytes()? == 0,
        })
    }

    pub fn last_processed_work_id(&self) -> i64 {
        self.last_processed_work_id
    }

    /// Appends the longest contiguous run of buffered results as a single
    /// write and advances `last_processed_work_id` past it.
    fn flush(&mut self) -> Result<(), TrackerError> {
        let mut run = Vec::new();
        let mut next = self.last_processed_work_id + 1;
        while let Some(result) = self.pending_write.remove(&(next as u64)) {
            run.push(result);
            next += 1;
        }
        if !run.is_empty() {
            self.writer.append(&run)?;
            self.last_processed_work_id = next - 1;
            tracing::debug!("Flushed output through row {}", self.last_processed_work_id);
        }
        Ok(())
    }

    /// Flush must have run before this so `output_offset` is consistent
    /// with `last_processed_work_id`.
    fn maybe_checkpoint(&mut self) -> Result<(), TrackerError> {
        if self.last_checkpoint_at.elapsed() < self.config.checkpoint_interval {
            return Ok(());
        }
        self.write_checkpoint()?;
        self.last_checkpoint_at = Instant::now();
        tracing::info!(
            "Checkpoint: last_processed_work_id={}, input_offset={}, output_offset={}, issued={}, pending={}, heap_size={}, expired_reissues={}",
            self.last_processed_work_id,
            self.reader.offset(),
            self.writer.offset(),
            self.issued.len(),
            self.pending_write.len(),
            self.issued_heap.len(),
            self.expired_reissues
        );
        Ok(())
    }

    fn write_checkpoint(&self) -> Result<(), TrackerError> {
        self.checkpoints.write(&CheckpointRecord {
            last_processed_work_id: self.last_processed_work_id,
            input_offset: self.reader.offset(),
            output_offset: self.writer.offset(),
        })
    }
}
