//! Append-only object log.
//!
//! Each record is laid out in native byte order as
//!
//! ```text
//! i32 object type | i32 stream count | (u32 length, bytes) * stream count
//! ```
//!
//! and is addressed by the byte offset it starts at. Offsets returned by
//! [`ObjectLog::append`] stay valid until [`ObjectLog::clear`].

use std::path::Path;

use netsieve_core::{ObjectType, ProtocolObject, Stream};
use tracing::{debug, info};

use crate::backend::{FileBackend, LogBackend, MemoryBackend};
use crate::error::{LogError, Result};

const RECORD_HEADER_LEN: u64 = 8;
const LENGTH_PREFIX_LEN: u64 = 4;

/// Serializes one object into a log record.
pub fn encode_record(object: &ProtocolObject) -> Result<Vec<u8>> {
    let count = i32::try_from(object.stream_count()).map_err(|_| LogError::TooLarge)?;
    let body: usize = object.streams().iter().map(|s| s.as_bytes().len()).sum();

    let mut record = Vec::with_capacity(8 + object.stream_count() * 4 + body);
    record.extend_from_slice(&object.object_type().as_raw().to_ne_bytes());
    record.extend_from_slice(&count.to_ne_bytes());
    for stream in object.streams() {
        let bytes = stream.as_bytes();
        let len = u32::try_from(bytes.len()).map_err(|_| LogError::TooLarge)?;
        record.extend_from_slice(&len.to_ne_bytes());
        record.extend_from_slice(bytes);
    }
    Ok(record)
}

/// A record read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Offset the record starts at.
    pub offset: u64,
    /// Offset of the following record.
    pub next_offset: u64,
    pub object: ProtocolObject,
}

/// Thread-safe append-only store of protocol objects.
///
/// Appends are serialized by the backend; reads of earlier records run
/// alongside them.
pub struct ObjectLog {
    backend: Box<dyn LogBackend>,
}

impl std::fmt::Debug for ObjectLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectLog").field("len", &self.len()).finish()
    }
}

impl ObjectLog {
    /// Creates a log over any backend.
    pub fn with_backend(backend: impl LogBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Creates an empty in-memory log.
    pub fn in_memory() -> Self {
        Self::with_backend(MemoryBackend::new())
    }

    /// Creates (or truncates) a file-backed log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening object log at: {:?}", path);
        Ok(Self::with_backend(FileBackend::create(path)?))
    }

    /// Opens an existing log file for replay without discarding its records.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let backend = FileBackend::open(path)?;
        info!("Loaded object log at: {:?} ({} bytes)", path, backend.len());
        Ok(Self::with_backend(backend))
    }

    pub fn len(&self) -> u64 {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `object` and returns the offset of its record.
    ///
    /// The record is written in one backend append, so concurrent appends
    /// occupy disjoint byte ranges. The object's streams are rewound afterwards.
    pub fn append(&self, object: &mut ProtocolObject) -> Result<u64> {
        let record = encode_record(object)?;
        let offset = self.backend.append(&record)?;
        object.rewind_all();
        debug!(
            "Logged {} at offset {} ({} bytes)",
            object.object_type(),
            offset,
            record.len()
        );
        Ok(offset)
    }

    /// Reads the record starting at `offset`.
    pub fn read(&self, offset: u64) -> Result<ProtocolObject> {
        Ok(self.read_record(offset)?.object)
    }

    /// Reads the record at `offset` along with the offset that follows it.
    pub fn read_record(&self, offset: u64) -> Result<LogRecord> {
        decode_at(self.backend.as_ref(), offset)
    }

    /// Discards every record; the next append returns offset 0.
    pub fn clear(&self) -> Result<()> {
        self.backend.clear()?;
        info!("Object log cleared");
        Ok(())
    }

    /// Iterates every record from the start of the log.
    ///
    /// Iteration stops after the first decode error, which is yielded.
    pub fn records(&self) -> Records<'_> {
        Records {
            log: self,
            offset: 0,
            done: false,
        }
    }
}

fn read_u32(backend: &dyn LogBackend, at: u64, record: u64) -> Result<u32> {
    let mut buf = [0u8; 4];
    backend
        .read_at(at, &mut buf)
        .map_err(|_| LogError::Truncated { offset: record })?;
    Ok(u32::from_ne_bytes(buf))
}

fn decode_at(backend: &dyn LogBackend, offset: u64) -> Result<LogRecord> {
    let total = backend.len();
    if offset >= total {
        return Err(LogError::Decode {
            offset,
            reason: format!("offset is past the end of the log ({} bytes)", total),
        });
    }
    if total - offset < RECORD_HEADER_LEN {
        return Err(LogError::Truncated { offset });
    }

    let raw_type = read_u32(backend, offset, offset)? as i32;
    let object_type = ObjectType::from_raw(raw_type).ok_or(LogError::UnknownObjectType {
        offset,
        value: raw_type,
    })?;

    let raw_count = read_u32(backend, offset + 4, offset)? as i32;
    let count = u64::try_from(raw_count).map_err(|_| LogError::Decode {
        offset,
        reason: format!("negative stream count {}", raw_count),
    })?;
    let mut pos = offset + RECORD_HEADER_LEN;
    if count * LENGTH_PREFIX_LEN > total - pos {
        return Err(LogError::Truncated { offset });
    }

    let mut streams = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = u64::from(read_u32(backend, pos, offset)?);
        pos += LENGTH_PREFIX_LEN;
        if len > total - pos {
            return Err(LogError::Truncated { offset });
        }
        let mut data = vec![0u8; len as usize];
        backend
            .read_at(pos, &mut data)
            .map_err(|_| LogError::Truncated { offset })?;
        pos += len;
        streams.push(Stream::from_bytes(data));
    }

    Ok(LogRecord {
        offset,
        next_offset: pos,
        object: ProtocolObject::from_streams(object_type, streams),
    })
}

/// Iterator over the records of an [`ObjectLog`].
pub struct Records<'a> {
    log: &'a ObjectLog,
    offset: u64,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.log.len() {
            return None;
        }
        match self.log.read_record(self.offset) {
            Ok(record) => {
                self.offset = record.next_offset;
                Some(Ok(record))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn http_response(body: &str) -> ProtocolObject {
        ProtocolObject::from_streams(
            ObjectType::HttpResponse,
            vec![
                Stream::from_bytes(b"HTTP/1.1 200 OK\r\n".to_vec()),
                Stream::from_bytes(b"Content-Type: text/html\r\n\r\n".to_vec()),
                Stream::from_bytes(body.as_bytes().to_vec()),
            ],
        )
    }

    #[test]
    fn test_append_and_read_back() {
        let log = ObjectLog::in_memory();
        let mut obj = http_response("<html>hello</html>");
        let offset = log.append(&mut obj).unwrap();
        assert_eq!(offset, 0);

        let back = log.read(offset).unwrap();
        assert_eq!(back.object_type(), ObjectType::HttpResponse);
        assert_eq!(back.stream_count(), 3);
        for i in 0usize..3 {
            assert_eq!(back.stream(i).unwrap().as_bytes(), obj.stream(i).unwrap().as_bytes());
            assert_eq!(back.stream(i).unwrap().position(), 0);
        }
    }

    #[test]
    fn test_offsets_increase() {
        let log = ObjectLog::in_memory();
        let first = log.append(&mut http_response("a")).unwrap();
        let second = log.append(&mut http_response("bb")).unwrap();
        let third = log.append(&mut ProtocolObject::new(ObjectType::RawOutgoing)).unwrap();
        assert!(first < second && second < third);

        assert_eq!(log.read(second).unwrap().stream_size(2usize), 2);
        assert_eq!(log.read(third).unwrap().object_type(), ObjectType::RawOutgoing);
    }

    #[test]
    fn test_append_rewinds_streams() {
        let log = ObjectLog::in_memory();
        let mut obj = http_response("body");
        obj.stream_mut(2usize).unwrap().read_all();
        log.append(&mut obj).unwrap();
        assert_eq!(obj.stream(2usize).unwrap().position(), 0);
    }

    #[test]
    fn test_clear_resets_offsets() {
        let log = ObjectLog::in_memory();
        log.append(&mut http_response("a")).unwrap();
        log.clear().unwrap();
        assert!(log.is_empty());
        assert_eq!(log.append(&mut http_response("b")).unwrap(), 0);
    }

    #[test]
    fn test_bad_offsets() {
        let log = ObjectLog::in_memory();
        assert!(matches!(log.read(0), Err(LogError::Decode { offset: 0, .. })));

        log.append(&mut http_response("hello")).unwrap();
        assert!(matches!(log.read(1000), Err(LogError::Decode { .. })));
        // Starting inside the status line decodes garbage type tags.
        assert!(log.read(3).is_err());
    }

    #[test]
    fn test_unknown_type_and_truncation() {
        let backend = MemoryBackend::new();
        backend.append(&77i32.to_ne_bytes()).unwrap();
        backend.append(&0i32.to_ne_bytes()).unwrap();
        let log = ObjectLog::with_backend(backend);
        assert!(matches!(
            log.read(0),
            Err(LogError::UnknownObjectType { offset: 0, value: 77 })
        ));

        let backend = MemoryBackend::new();
        backend.append(&600i32.to_ne_bytes()).unwrap();
        backend.append(&1i32.to_ne_bytes()).unwrap();
        backend.append(&100u32.to_ne_bytes()).unwrap();
        backend.append(b"short").unwrap();
        let log = ObjectLog::with_backend(backend);
        assert!(matches!(log.read(0), Err(LogError::Truncated { offset: 0 })));
    }

    #[test]
    fn test_negative_stream_count() {
        let backend = MemoryBackend::new();
        backend.append(&600i32.to_ne_bytes()).unwrap();
        backend.append(&(-1i32).to_ne_bytes()).unwrap();
        let log = ObjectLog::with_backend(backend);
        assert!(matches!(log.read(0), Err(LogError::Decode { .. })));
    }

    #[test]
    fn test_records_iterates_in_order() {
        let log = ObjectLog::in_memory();
        let a = log.append(&mut http_response("a")).unwrap();
        let b = log.append(&mut ProtocolObject::new(ObjectType::SmtpMailOutgoing)).unwrap();

        let records: Vec<_> = log.records().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, a);
        assert_eq!(records[1].offset, b);
        assert_eq!(records[1].next_offset, log.len());
    }

    #[test]
    fn test_concurrent_appends_are_disjoint() {
        let log = Arc::new(ObjectLog::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            let mut obj = http_response(&format!("thread {} item {}", t, i));
                            let offset = log.append(&mut obj).unwrap();
                            (offset, obj)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut written = Vec::new();
        for handle in handles {
            written.extend(handle.join().unwrap());
        }

        let mut offsets: Vec<u64> = written.iter().map(|(o, _)| *o).collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), 400);

        for (offset, obj) in &written {
            assert_eq!(&log.read(*offset).unwrap(), obj);
        }

        let mut spans: Vec<(u64, u64)> = written
            .iter()
            .map(|(offset, obj)| (*offset, encode_record(obj).unwrap().len() as u64))
            .collect();
        let total: u64 = spans.iter().map(|(_, len)| len).sum();
        assert_eq!(total, log.len());

        spans.sort_unstable();
        let mut expected = 0;
        for (offset, len) in spans {
            assert_eq!(offset, expected);
            expected = offset + len;
        }
        assert_eq!(expected, log.len());
    }

    #[test]
    fn test_reads_run_alongside_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(ObjectLog::open(dir.path().join("objects.log")).unwrap());
        let first = log.append(&mut http_response("first")).unwrap();

        let writer = {
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                for i in 0..200 {
                    log.append(&mut http_response(&format!("item {}", i))).unwrap();
                }
            })
        };
        for _ in 0..200 {
            let obj = log.read(first).unwrap();
            assert_eq!(obj.stream(2usize).unwrap().as_bytes(), b"first");
        }
        writer.join().unwrap();

        assert_eq!(log.records().count(), 201);
        assert!(log.records().all(|r| r.is_ok()));
    }

    #[test]
    fn test_file_log_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects.log");
        let offset = {
            let log = ObjectLog::open(&path).unwrap();
            log.append(&mut http_response("first")).unwrap();
            log.append(&mut http_response("second")).unwrap()
        };

        let replay = ObjectLog::load(&path).unwrap();
        let obj = replay.read(offset).unwrap();
        assert_eq!(obj.stream(2usize).unwrap().as_bytes(), b"second");
        assert_eq!(replay.records().count(), 2);

        let truncated = ObjectLog::open(&path).unwrap();
        assert!(truncated.is_empty());
    }
}
