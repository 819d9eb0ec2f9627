use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Sequential reader over the input file.
///
/// Owns the assignment of work ids (zero-based line numbers) and the byte
/// offset recorded in checkpoints. Lines are pulled on demand, one per call,
/// so memory stays bounded by the rows currently in flight.
#[derive(Debug)]
pub struct InputReader {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    next_work_id: u64,
}

impl InputReader {
    /// Opens the input file positioned at `offset`, ready to assign
    /// `next_work_id` to the next line read.
    pub fn open(path: &Path, offset: u64, next_work_id: u64) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            offset,
            next_work_id,
        })
    }

    /// Reads one `\n`-terminated line, strips the newline and assigns it the
    /// next work id. Returns `None` at end of input.
    ///
    /// An unterminated trailing fragment is never emitted: the reader seeks
    /// back so the same bytes are read again once the file has grown past
    /// the newline.
    pub fn next_line(&mut self) -> io::Result<Option<(u64, String)>> {
        match self.read_terminated_line()? {
            Some(content) => {
                let work_id = self.next_work_id;
                self.next_work_id += 1;
                Ok(Some((work_id, content)))
            }
            None => Ok(None),
        }
    }

    /// Consumes one line without returning its content. Used during startup
    /// reconciliation, when the output file already holds results for lines
    /// past the checkpointed input offset.
    pub fn skip_line(&mut self) -> io::Result<bool> {
        match self.read_terminated_line()? {
            Some(_) => {
                self.next_work_id += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn read_terminated_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() != Some(&b'\n') {
            // Partial line with no newline yet; rewind and wait for more bytes.
            self.reader.seek(SeekFrom::Start(self.offset))?;
            return Ok(None);
        }
        self.offset += n as u64;
        buf.pop();
        let content = String::from_utf8(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(Some(content))
    }

    /// Bytes between the read position and the current end of the file.
    pub fn remaining_bytes(&self) -> io::Result<u64> {
        let len = std::fs::metadata(&self.path)?.len();
        Ok(len.saturating_sub(self.offset))
    }

    /// Byte offset after the last successfully read line.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The work id the next line will be assigned.
    pub fn next_work_id(&self) -> u64 {
        self.next_work_id
    }
}
