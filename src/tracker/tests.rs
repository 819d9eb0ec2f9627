//! Tracker Module Tests
//!
//! Unit tests for the dispatch state machine and its file-backed parts.
//!
//! ## Test Scopes
//! - **Issuance**: input-order handout, timeout reissue, stale heap entries.
//! - **Completion**: in-order and out-of-order flushing, duplicates,
//!   never-issued rejection.
//! - **Persistence**: checkpoint write/load, resume, startup reconciliation
//!   and the fatal inconsistency cases.

#[cfg(test)]
mod tests {
    use crate::tracker::checkpoint::{CheckpointRecord, CheckpointStore};
    use crate::tracker::error::TrackerError;
    use crate::tracker::tracker::DataTracker;
    use crate::tracker::types::TrackerConfig;
    use std::fs;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    // Short timeouts keep the timing-sensitive tests fast.
    const WORK_TIMEOUT: Duration = Duration::from_millis(50);
    const CHECKPOINT_INTERVAL: Duration = Duration::from_millis(20);

    fn config_with_input(dir: &TempDir, content: &str) -> TrackerConfig {
        let infile = dir.path().join("input.jsonl");
        fs::write(&infile, content).unwrap();
        TrackerConfig {
            infile,
            outfile: dir.path().join("output.jsonl"),
            checkpoint: dir.path().join("output.jsonl.checkpoint"),
            work_timeout: WORK_TIMEOUT,
            checkpoint_interval: CHECKPOINT_INTERVAL,
        }
    }

    /// Input with `rows` lines shaped like `row_content_<i>`.
    fn config_with_rows(dir: &TempDir, rows: usize) -> TrackerConfig {
        let content: String = (0..rows).map(|i| format!("row_content_{}\n", i)).collect();
        config_with_input(dir, &content)
    }

    fn output_lines(config: &TrackerConfig) -> Vec<String> {
        match fs::read_to_string(&config.outfile) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(_) => vec![],
        }
    }

    fn complete(tracker: &mut DataTracker, work_id: u64, result: &str) {
        tracker
            .complete_work_batch(vec![(work_id, result.to_string())])
            .unwrap();
    }

    // ============================================================
    // ISSUANCE
    // ============================================================

    #[test]
    fn test_cold_start() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let tracker = DataTracker::open(config).unwrap();

        let status = tracker.status().unwrap();
        assert_eq!(status.last_processed_work_id, -1);
        assert_eq!(status.next_work_id, 0);
        assert_eq!(status.issued, 0);
        assert_eq!(status.pending_write, 0);
        assert_eq!(status.expired_reissues, 0);
        assert!(!status.input_eof);
    }

    #[test]
    fn test_issues_rows_in_input_order() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let mut tracker = DataTracker::open(config).unwrap();

        let batch = tracker.get_work_batch(3).unwrap();
        assert_eq!(batch.len(), 3);
        for (i, item) in batch.iter().enumerate() {
            assert_eq!(item.work_id, i as u64);
            assert_eq!(item.row_content, format!("row_content_{}", i));
        }
        assert_eq!(tracker.status().unwrap().issued, 3);
    }

    #[test]
    fn test_reissue_after_timeout() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let mut tracker = DataTracker::open(config).unwrap();

        let first = tracker.get_work_batch(1).unwrap();
        assert_eq!(first[0].work_id, 0);

        std::thread::sleep(WORK_TIMEOUT + Duration::from_millis(20));

        // The expired row comes back ahead of fresh input.
        let second = tracker.get_work_batch(2).unwrap();
        assert_eq!(second[0].work_id, 0);
        assert_eq!(second[0].row_content, "row_content_0");
        assert_eq!(second[1].work_id, 1);
        assert_eq!(tracker.status().unwrap().expired_reissues, 1);
    }

    #[test]
    fn test_completed_row_is_never_reissued() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 2);
        let mut tracker = DataTracker::open(config).unwrap();

        let batch = tracker.get_work_batch(1).unwrap();
        complete(&mut tracker, batch[0].work_id, "result_0");

        // The heap still holds the stale entry for row 0; it must be
        // discarded on pop instead of reissued.
        std::thread::sleep(WORK_TIMEOUT + Duration::from_millis(20));
        let batch = tracker.get_work_batch(1).unwrap();
        assert_eq!(batch[0].work_id, 1);
        assert_eq!(tracker.status().unwrap().expired_reissues, 0);
    }

    // ============================================================
    // COMPLETION AND FLUSH
    // ============================================================

    #[test]
    fn test_in_order_completion_writes_immediately() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let mut tracker = DataTracker::open(config.clone()).unwrap();

        let batch = tracker.get_work_batch(1).unwrap();
        complete(&mut tracker, batch[0].work_id, "result_0");

        assert_eq!(output_lines(&config), vec!["result_0"]);
        assert_eq!(tracker.last_processed_work_id(), 0);
    }

    #[test]
    fn test_out_of_order_completion_buffers_then_flushes() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let mut tracker = DataTracker::open(config.clone()).unwrap();

        let batch = tracker.get_work_batch(3).unwrap();
        complete(&mut tracker, batch[0].work_id, "result_0");
        assert_eq!(output_lines(&config), vec!["result_0"]);

        // Row 2 cannot be written while row 1 is outstanding.
        complete(&mut tracker, batch[2].work_id, "result_2");
        assert_eq!(tracker.last_processed_work_id(), 0);
        assert_eq!(tracker.status().unwrap().pending_write, 1);
        assert_eq!(output_lines(&config), vec!["result_0"]);

        // Completing row 1 releases the contiguous run 1..=2.
        complete(&mut tracker, batch[1].work_id, "result_1");
        assert_eq!(tracker.last_processed_work_id(), 2);
        assert_eq!(tracker.status().unwrap().pending_write, 0);
        assert_eq!(
            output_lines(&config),
            vec!["result_0", "result_1", "result_2"]
        );
    }

    #[test]
    fn test_duplicate_completion_discarded() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let mut tracker = DataTracker::open(config.clone()).unwrap();

        let batch = tracker.get_work_batch(1).unwrap();
        complete(&mut tracker, batch[0].work_id, "result_0");
        complete(&mut tracker, batch[0].work_id, "result_duplicate");

        assert_eq!(output_lines(&config), vec!["result_0"]);
        assert_eq!(tracker.status().unwrap().duplicates_discarded, 1);
    }

    #[test]
    fn test_never_issued_row_rejects_batch_untouched() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let mut tracker = DataTracker::open(config.clone()).unwrap();

        tracker.get_work_batch(3).unwrap();
        let err = tracker
            .complete_work_batch(vec![
                (0, "result_0".to_string()),
                (99, "bogus".to_string()),
            ])
            .unwrap_err();
        assert!(matches!(err, TrackerError::UnknownWorkId(99)));

        // Nothing was applied: row 0 is still issued and completes fine.
        assert_eq!(output_lines(&config).len(), 0);
        complete(&mut tracker, 0, "result_0");
        assert_eq!(output_lines(&config), vec!["result_0"]);
    }

    // ============================================================
    // BOUNDARY BEHAVIORS
    // ============================================================

    #[test]
    fn test_empty_input_is_immediately_complete() {
        let dir = TempDir::new().unwrap();
        let config = config_with_input(&dir, "");
        let mut tracker = DataTracker::open(config).unwrap();

        assert!(tracker.all_work_complete().unwrap());
        assert!(tracker.get_work_batch(5).unwrap().is_empty());
    }

    #[test]
    fn test_empty_lines_are_valid_rows() {
        let dir = TempDir::new().unwrap();
        let config = config_with_input(&dir, "\n\nrow_content_2\n");
        let mut tracker = DataTracker::open(config.clone()).unwrap();

        let batch = tracker.get_work_batch(5).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].row_content, "");
        assert_eq!(batch[1].row_content, "");
        assert_eq!(batch[2].row_content, "row_content_2");

        for item in &batch {
            complete(&mut tracker, item.work_id, &format!("result_{}", item.work_id));
        }
        assert_eq!(
            output_lines(&config),
            vec!["result_0", "result_1", "result_2"]
        );
        assert!(tracker.all_work_complete().unwrap());
    }

    #[test]
    fn test_unterminated_trailing_line_not_emitted() {
        let dir = TempDir::new().unwrap();
        let config = config_with_input(&dir, "alpha\nbeta");
        let mut tracker = DataTracker::open(config.clone()).unwrap();

        let batch = tracker.get_work_batch(5).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].row_content, "alpha");

        complete(&mut tracker, 0, "result_0");
        // The unterminated tail still counts as outstanding input.
        assert!(!tracker.all_work_complete().unwrap());

        // Once the newline lands, the row is readable.
        let mut infile = fs::OpenOptions::new()
            .append(true)
            .open(&config.infile)
            .unwrap();
        infile.write_all(b"\n").unwrap();

        let batch = tracker.get_work_batch(5).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].work_id, 1);
        assert_eq!(batch[0].row_content, "beta");

        complete(&mut tracker, 1, "result_1");
        assert!(tracker.all_work_complete().unwrap());
    }

    #[test]
    fn test_all_work_complete_requires_issued_empty() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 1);
        let mut tracker = DataTracker::open(config).unwrap();

        let batch = tracker.get_work_batch(1).unwrap();
        // Input is exhausted but row 0 is still held by a worker.
        assert!(!tracker.all_work_complete().unwrap());

        complete(&mut tracker, batch[0].work_id, "result_0");
        assert!(tracker.all_work_complete().unwrap());
    }

    #[test]
    fn test_retry_hint() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 1);
        let mut tracker = DataTracker::open(config).unwrap();

        // Nothing issued: small constant.
        assert_eq!(tracker.retry_hint(), 5);

        // With an issuance expiring within a second, the hint floors at 1.
        tracker.get_work_batch(1).unwrap();
        assert_eq!(tracker.retry_hint(), 1);
    }

    // ============================================================
    // CHECKPOINT AND RESUME
    // ============================================================

    #[test]
    fn test_checkpoint_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));

        assert!(store.load().unwrap().is_none());

        let record = CheckpointRecord {
            last_processed_work_id: 41,
            input_offset: 1000,
            output_offset: 500,
        };
        store.write(&record).unwrap();
        assert_eq!(store.load().unwrap(), Some(record));

        // An empty file is a fresh start, not corruption.
        fs::write(store.path(), b"").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_written_after_interval() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let mut tracker = DataTracker::open(config.clone()).unwrap();

        let batch = tracker.get_work_batch(2).unwrap();
        complete(&mut tracker, batch[0].work_id, "result_0");
        std::thread::sleep(CHECKPOINT_INTERVAL + Duration::from_millis(10));
        complete(&mut tracker, batch[1].work_id, "result_1");

        let record = CheckpointStore::new(&config.checkpoint)
            .load()
            .unwrap()
            .expect("checkpoint should exist after the interval elapsed");
        assert_eq!(record.last_processed_work_id, 1);
        assert_eq!(record.output_offset, "result_0\nresult_1\n".len() as u64);
    }

    #[test]
    fn test_close_writes_final_checkpoint() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let mut tracker = DataTracker::open(config.clone()).unwrap();

        let batch = tracker.get_work_batch(2).unwrap();
        complete(&mut tracker, batch[0].work_id, "result_0");
        complete(&mut tracker, batch[1].work_id, "result_1");
        tracker.close().unwrap();

        let record = CheckpointStore::new(&config.checkpoint)
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(record.last_processed_work_id, 1);
        assert_eq!(record.input_offset, 2 * "row_content_0\n".len() as u64);
        assert_eq!(record.output_offset, "result_0\nresult_1\n".len() as u64);
    }

    #[test]
    fn test_resume_from_checkpoint() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 4);

        {
            let mut tracker = DataTracker::open(config.clone()).unwrap();
            let batch = tracker.get_work_batch(2).unwrap();
            complete(&mut tracker, batch[0].work_id, "result_0");
            complete(&mut tracker, batch[1].work_id, "result_1");
            tracker.close().unwrap();
        }

        let mut tracker = DataTracker::open(config.clone()).unwrap();
        let status = tracker.status().unwrap();
        assert_eq!(status.last_processed_work_id, 1);
        assert_eq!(status.next_work_id, 2);

        let batch = tracker.get_work_batch(2).unwrap();
        assert_eq!(batch[0].work_id, 2);
        assert_eq!(batch[0].row_content, "row_content_2");
        complete(&mut tracker, 2, "result_2");
        complete(&mut tracker, 3, "result_3");

        assert_eq!(
            output_lines(&config),
            vec!["result_0", "result_1", "result_2", "result_3"]
        );
        assert!(tracker.all_work_complete().unwrap());
    }

    #[test]
    fn test_resume_reconciles_output_past_checkpoint() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let row_len = "row_content_0\n".len() as u64;
        let result_len = "result_0\n".len() as u64;

        // Five results on disk but the checkpoint only knows about three:
        // rows 3 and 4 were flushed after the last checkpoint, then the
        // process died.
        fs::write(
            &config.outfile,
            "result_0\nresult_1\nresult_2\nresult_3\nresult_4\n",
        )
        .unwrap();
        CheckpointStore::new(&config.checkpoint)
            .write(&CheckpointRecord {
                last_processed_work_id: 2,
                input_offset: 3 * row_len,
                output_offset: 3 * result_len,
            })
            .unwrap();

        let mut tracker = DataTracker::open(config.clone()).unwrap();
        let status = tracker.status().unwrap();
        assert_eq!(status.last_processed_work_id, 4);
        assert_eq!(status.next_work_id, 5);

        let batch = tracker.get_work_batch(1).unwrap();
        assert_eq!(batch[0].work_id, 5);
        assert_eq!(batch[0].row_content, "row_content_5");
    }

    #[test]
    fn test_resume_truncates_torn_output_tail() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        let row_len = "row_content_0\n".len() as u64;
        let result_len = "result_0\n".len() as u64;

        // A crash mid-append left row 4's result without its newline.
        fs::write(
            &config.outfile,
            "result_0\nresult_1\nresult_2\nresult_3\nresult_4",
        )
        .unwrap();
        CheckpointStore::new(&config.checkpoint)
            .write(&CheckpointRecord {
                last_processed_work_id: 2,
                input_offset: 3 * row_len,
                output_offset: 3 * result_len,
            })
            .unwrap();

        let mut tracker = DataTracker::open(config.clone()).unwrap();
        let status = tracker.status().unwrap();
        assert_eq!(status.last_processed_work_id, 3);
        assert_eq!(status.next_work_id, 4);
        assert_eq!(
            output_lines(&config),
            vec!["result_0", "result_1", "result_2", "result_3"]
        );

        // Row 4 is dispatched again and its result lands cleanly.
        let batch = tracker.get_work_batch(1).unwrap();
        assert_eq!(batch[0].work_id, 4);
        complete(&mut tracker, 4, "result_4_retry");
        assert_eq!(output_lines(&config).last().unwrap(), "result_4_retry");
    }

    // ============================================================
    // FATAL INCONSISTENCIES
    // ============================================================

    #[test]
    fn test_missing_checkpoint_with_existing_output_fatal() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        fs::write(&config.outfile, "result_0\n").unwrap();

        let err = DataTracker::open(config).unwrap_err();
        assert!(matches!(err, TrackerError::CheckpointInconsistent(_)));
    }

    #[test]
    fn test_corrupt_checkpoint_fatal() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 7);
        fs::write(&config.checkpoint, "not json {{").unwrap();

        let err = DataTracker::open(config).unwrap_err();
        assert!(matches!(err, TrackerError::CheckpointInconsistent(_)));
    }

    #[test]
    fn test_input_truncated_below_checkpoint_fatal() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 2);
        CheckpointStore::new(&config.checkpoint)
            .write(&CheckpointRecord {
                last_processed_work_id: 10,
                input_offset: 10_000,
                output_offset: 0,
            })
            .unwrap();

        let err = DataTracker::open(config).unwrap_err();
        assert!(matches!(err, TrackerError::CheckpointInconsistent(_)));
    }

    #[test]
    fn test_output_shorter_than_checkpoint_fatal() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 2);
        CheckpointStore::new(&config.checkpoint)
            .write(&CheckpointRecord {
                last_processed_work_id: 0,
                input_offset: 0,
                output_offset: 100,
            })
            .unwrap();

        let err = DataTracker::open(config).unwrap_err();
        assert!(matches!(err, TrackerError::CheckpointInconsistent(_)));
    }

    #[test]
    fn test_more_output_lines_than_input_fatal() {
        let dir = TempDir::new().unwrap();
        let config = config_with_rows(&dir, 1);
        fs::write(&config.outfile, "result_0\nresult_1\nresult_2\n").unwrap();
        CheckpointStore::new(&config.checkpoint)
            .write(&CheckpointRecord {
                last_processed_work_id: -1,
                input_offset: 0,
                output_offset: 0,
            })
            .unwrap();

        let err = DataTracker::open(config).unwrap_err();
        assert!(matches!(err, TrackerError::CheckpointInconsistent(_)));
    }
}
