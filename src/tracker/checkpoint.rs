use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::TrackerError;

/// Durable progress snapshot.
///
/// `last_processed_work_id` is `-1` until the first output line has been
/// written. `input_offset` points at the byte right after input line
/// `last_processed_work_id` plus any lines still in flight when the record
/// was written; `output_offset` is the output file length at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub last_processed_work_id: i64,
    pub input_offset: u64,
    pub output_offset: u64,
}

/// Atomic persistence for [`CheckpointRecord`].
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored record, or `None` when the file is missing or
    /// empty (fresh start). A non-empty file that fails to parse cannot be
    /// trusted and startup must not proceed from it.
    pub fn load(&self) -> Result<Option<CheckpointRecord>, TrackerError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        let record = serde_json::from_slice(&bytes).map_err(|err| {
            TrackerError::CheckpointInconsistent(format!(
                "unparseable checkpoint file {}: {}",
                self.path.display(),
                err
            ))
        })?;
        Ok(Some(record))
    }

    /// Persists the record atomically: serialize to a sibling temp file,
    /// fsync it, then rename over the checkpoint path.
    pub fn write(&self, record: &CheckpointRecord) -> Result<(), TrackerError> {
        let bytes = serde_json::to_vec(record).map_err(std::io::Error::from)?;
        let tmp_path = {
            let mut tmp = self.path.as_os_str().to_owned();
            tmp.push(".tmp");
            PathBuf::from(tmp)
        };
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
