use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Append-only writer for the output file.
///
/// The writer does not own serialization: the tracker only calls `append`
/// with the next contiguous block of results, in work id order. Each append
/// is one combined write flushed to the OS buffer; the output file is never
/// fsynced (only the checkpoint is), so the checkpoint stays conservative
/// with respect to the file.
#[derive(Debug)]
pub struct OutputWriter {
    file: File,
    offset: u64,
}

impl OutputWriter {
    /// Opens (creating if needed) the output file for appending. The offset
    /// starts at the current end of the file.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let offset = file.metadata()?.len();
        Ok(Self { file, offset })
    }

    /// Appends the lines as one combined write, each terminated by a single
    /// `\n`, and flushes to the OS buffer.
    pub fn append(&mut self, lines: &[String]) -> io::Result<()> {
        let mut buf = Vec::with_capacity(lines.iter().map(|line| line.len() + 1).sum());
        for line in lines {
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        self.file.write_all(&buf)?;
        self.file.flush()?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    /// Reads the raw bytes from `from` to the current end of the file.
    /// Used during startup reconciliation.
    pub fn read_tail(&mut self, from: u64) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.file.seek(SeekFrom::Start(from))?;
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Drops everything past `len` bytes. Used to discard a torn trailing
    /// fragment left by a crash mid-append.
    pub fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.offset = len;
        Ok(())
    }

    /// Byte offset at the current end of the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}
