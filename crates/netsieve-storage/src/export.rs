//! Per-object binary export.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use netsieve_core::ProtocolObject;
use tracing::debug;

use crate::error::Result;

/// Writes every stream of `object`, in order, to a new file at `path`.
///
/// Fails if the file already exists.
pub fn write_streams(path: &Path, object: &ProtocolObject) -> Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    for stream in object.streams() {
        file.write_all(stream.as_bytes())?;
    }
    file.flush()?;
    Ok(())
}

/// Dumps objects into a directory as `<connection>_<seq>_<type>.bin`.
#[derive(Debug)]
pub struct ObjectExporter {
    dir: PathBuf,
    seq: AtomicU64,
}

impl ObjectExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Exports one object and returns the written path.
    pub fn export(&self, connection_id: u64, object: &ProtocolObject) -> Result<PathBuf> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}_{}_{}.bin", connection_id, seq, object.object_type());
        let path = self.dir.join(name);
        write_streams(&path, object)?;
        debug!("Exported {} to {:?}", object.object_type(), path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsieve_core::{ObjectType, Stream};

    fn object() -> ProtocolObject {
        ProtocolObject::from_streams(
            ObjectType::HttpRequest,
            vec![
                Stream::from_bytes(b"GET / HTTP/1.1\r\n".to_vec()),
                Stream::from_bytes(b"Host: a\r\n\r\n".to_vec()),
                Stream::new(),
            ],
        )
    }

    #[test]
    fn exports_concatenated_streams() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ObjectExporter::new(dir.path());

        let first = exporter.export(7, &object()).unwrap();
        let second = exporter.export(7, &object()).unwrap();
        assert_eq!(first.file_name().unwrap(), "7_0_HttpRequest.bin");
        assert_eq!(second.file_name().unwrap(), "7_1_HttpRequest.bin");
        assert_eq!(
            std::fs::read(first).unwrap(),
            b"GET / HTTP/1.1\r\nHost: a\r\n\r\n"
        );
    }

    #[test]
    fn existing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.bin");
        std::fs::write(&path, b"old").unwrap();
        assert!(write_streams(&path, &object()).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"old");
    }
}
