//! Seekable, growable byte container backing one facet of a protocol object.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// A byte buffer with an independent read/write cursor.
///
/// Writing past the end grows the buffer; `size()` always reports the
/// highest offset ever written until [`Stream::set_end`] or
/// [`Stream::reset`] shrinks it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stream {
    data: Vec<u8>,
    pos: usize,
}

impl Stream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stream holding `bytes`, positioned at 0.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: bytes.into(),
            pos: 0,
        }
    }

    /// Number of bytes held.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Moves the cursor to the start.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Drops all content and rewinds.
    pub fn reset(&mut self) {
        self.data.clear();
        self.pos = 0;
    }

    /// Truncates the stream at the current position.
    pub fn set_end(&mut self) {
        self.data.truncate(self.pos);
    }

    /// Borrows the whole content regardless of the cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copies the whole content out and rewinds, leaving the stream reusable.
    pub fn read_all(&mut self) -> Vec<u8> {
        self.pos = 0;
        self.data.clone()
    }

    /// Replaces the content with `bytes` and rewinds.
    pub fn replace(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.pos = 0;
    }

    /// Consumes the stream, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for Stream {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target: i128 = match from {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::End(n) => self.data.len() as i128 + n as i128,
            SeekFrom::Current(n) => self.pos as i128 + n as i128,
        };
        if target < 0 || target > usize::MAX as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }
}
