//! Byte stores behind the object log.
//!
//! Backends synchronize themselves. Reads of already written ranges never
//! wait on the lock that serializes appends.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use directories::ProjectDirs;
use parking_lot::{Mutex, RwLock};

/// Append-only byte store with random-access reads.
pub trait LogBackend: Send + Sync {
    /// Current size in bytes.
    fn len(&self) -> u64;

    /// Returns true if nothing has been written.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `bytes` and returns the offset they start at.
    ///
    /// Concurrent appends land in disjoint ranges.
    fn append(&self, bytes: &[u8]) -> io::Result<u64>;

    /// Fills `buf` from `offset`; fails if the range is not fully written.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Discards all content.
    fn clear(&self) -> io::Result<()>;
}

fn out_of_range(offset: u64, len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {} bytes at {} past end of log", len, offset),
    )
}

/// Growable in-memory store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogBackend for MemoryBackend {
    fn len(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn append(&self, bytes: &[u8]) -> io::Result<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let data = self.data.read();
        let start = usize::try_from(offset).map_err(|_| out_of_range(offset, buf.len()))?;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| data.get(start..end))
            .ok_or_else(|| out_of_range(offset, buf.len()))?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        self.data.write().clear();
        Ok(())
    }
}

/// File-backed store using positional reads and writes.
///
/// `len` only grows after the bytes below it are on disk, so a reader that
/// checks it first never sees a partly written record.
#[derive(Debug)]
pub struct FileBackend {
    file: File,
    path: PathBuf,
    len: AtomicU64,
    append_lock: Mutex<()>,
}

impl FileBackend {
    fn with_file(file: File, path: PathBuf, len: u64) -> Self {
        Self {
            file,
            path,
            len: AtomicU64::new(len),
            append_lock: Mutex::new(()),
        }
    }

    /// Creates the file, truncating any existing content.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self::with_file(file, path, 0))
    }

    /// Opens an existing file, keeping its content.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self::with_file(file, path, len))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default log location in the per-user data directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "netsieve", "netsieve")
            .map(|dirs| dirs.data_dir().join("objects.log"))
    }
}

impl LogBackend for FileBackend {
    fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    fn append(&self, bytes: &[u8]) -> io::Result<u64> {
        let _guard = self.append_lock.lock();
        let offset = self.len.load(Ordering::Acquire);
        positional::write_all_at(&self.file, bytes, offset)?;
        self.len.store(offset + bytes.len() as u64, Ordering::Release);
        Ok(offset)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let fits = offset
            .checked_add(buf.len() as u64)
            .is_some_and(|end| end <= self.len());
        if !fits {
            return Err(out_of_range(offset, buf.len()));
        }
        positional::read_exact_at(&self.file, buf, offset)
    }

    fn clear(&self) -> io::Result<()> {
        let _guard = self.append_lock.lock();
        self.len.store(0, Ordering::Release);
        self.file.set_len(0)
    }
}

#[cfg(unix)]
mod positional {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub(super) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
        file.read_exact_at(buf, offset)
    }

    pub(super) fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
        file.write_all_at(buf, offset)
    }
}

#[cfg(windows)]
mod positional {
    use std::fs::File;
    use std::io;
    use std::os::windows::fs::FileExt;

    pub(super) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match file.seek_read(buf, offset)? {
                0 => return Err(io::ErrorKind::UnexpectedEof.into()),
                n => {
                    buf = &mut std::mem::take(&mut buf)[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }

    pub(super) fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match file.seek_write(buf, offset)? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(backend: &dyn LogBackend) {
        assert!(backend.is_empty());
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.len(), 11);

        let mut buf = [0u8; 5];
        backend.read_at(6, &mut buf).unwrap();
        assert_eq!(&buf, b"world");

        let mut past = [0u8; 4];
        assert!(backend.read_at(9, &mut past).is_err());
        assert!(backend.read_at(u64::MAX, &mut past).is_err());

        backend.clear().unwrap();
        assert_eq!(backend.len(), 0);
        assert_eq!(backend.append(b"x").unwrap(), 0);
    }

    #[test]
    fn memory_backend() {
        exercise(&MemoryBackend::new());
    }

    #[test]
    fn file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("objects.log");
        exercise(&FileBackend::create(&path).unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1);
    }

    #[test]
    fn file_backend_reopen_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects.log");
        {
            let backend = FileBackend::create(&path).unwrap();
            backend.append(b"abc").unwrap();
        }
        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.append(b"d").unwrap(), 3);

        let mut buf = [0u8; 4];
        reopened.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn file_reads_do_not_wait_for_appends() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::create(dir.path().join("objects.log")).unwrap();
        backend.append(b"written").unwrap();

        let _appending = backend.append_lock.lock();
        let mut buf = [0u8; 7];
        backend.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"written");
    }

    #[test]
    fn default_path_is_named() {
        if let Some(path) = FileBackend::default_path() {
            assert!(path.ends_with("objects.log"));
        }
    }
}
