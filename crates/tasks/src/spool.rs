//! Downloads spooled to an anonymous temporary file.
//!
//! The file is written once through tokio and then read back through
//! [`SpoolReader`]s. Each reader keeps its own position and reads with
//! positional I/O, so clones handed to parallel archive workers never move
//! each other's cursor.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;

/// Create an empty spool file, removed when the last handle drops.
pub fn create() -> io::Result<tokio::fs::File> {
    Ok(tokio::fs::File::from_std(tempfile::tempfile()?))
}

/// Finish writing `file` and open it for reading.
pub async fn finish(mut file: tokio::fs::File) -> io::Result<SpoolReader> {
    file.flush().await?;
    let file = file.into_std().await;
    SpoolReader::new(file)
}

/// Read-only, seekable view of a spooled file.
#[derive(Debug, Clone)]
pub struct SpoolReader {
    file: Arc<File>,
    size: u64,
    pos: u64,
}

impl SpoolReader {
    pub fn new(file: File) -> io::Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self { file: Arc::new(file), size, pos: 0 })
    }

    /// Length of the file when it was opened.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for SpoolReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let n = read_at(&self.file, buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SpoolReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(n) => self.size.checked_add_signed(n),
            SeekFrom::Current(n) => self.pos.checked_add_signed(n),
        };
        let Some(target) = target else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative or overflowing position"));
        };
        self.pos = target;
        Ok(target)
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}
