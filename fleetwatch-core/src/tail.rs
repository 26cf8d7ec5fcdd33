//! Incremental transcript reading
//!
//! A [`TailCursor`] remembers how far into a file it has read. Each call to
//! [`TailCursor::read_new_lines`] returns only lines that were appended since
//! the previous call and are terminated by a newline; a partially written
//! last line stays on disk until its newline arrives.
//!
//! Reads are bounded: one call consumes at most one chunk of complete lines
//! (more only when a single line is longer than a chunk). Callers drain a
//! large backlog by calling again until nothing is returned.

use crate::error::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Default upper bound on bytes read per call
pub const READ_CHUNK_BYTES: u64 = 1024 * 1024;

/// Read position within one transcript file
#[derive(Debug, Clone)]
pub struct TailCursor {
    path: PathBuf,
    offset: u64,
    chunk_bytes: u64,
}

impl TailCursor {
    /// Cursor positioned at the current end of `path`.
    ///
    /// History already in the file is never replayed.
    pub fn at_end(path: &Path) -> Result<Self> {
        let offset = std::fs::metadata(path)?.len();
        Ok(Self::at_offset(path, offset))
    }

    /// Cursor positioned at an explicit byte offset
    pub fn at_offset(path: &Path, offset: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            offset,
            chunk_bytes: READ_CHUNK_BYTES,
        }
    }

    /// Override the per-call read bound (at least one byte)
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_bytes = bytes.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read complete lines appended since the last call.
    ///
    /// The offset only advances past bytes that were returned as part of a
    /// complete line. If the file shrank below the offset nothing is read and
    /// the offset is kept. Empty lines are dropped and invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let size = std::fs::metadata(&self.path)?.len();

        if size < self.offset {
            tracing::debug!(
                path = %self.path.display(),
                offset = self.offset,
                size,
                "File shrank below read offset, waiting for it to grow"
            );
            return Ok(Vec::new());
        }
        if size == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;

        let mut remaining = file.take(size - self.offset);
        let mut buf = Vec::new();
        loop {
            let start = buf.len();
            let read = (&mut remaining)
                .take(self.chunk_bytes)
                .read_to_end(&mut buf)?;
            if read == 0 || buf[start..].contains(&b'\n') {
                break;
            }
        }

        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &buf[..=last_newline];
        self.offset += complete.len() as u64;

        Ok(String::from_utf8_lossy(complete)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }
}
