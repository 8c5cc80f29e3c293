//! Netsieve Storage - append-only object log.
//!
//! Accepted and blocked objects are serialized into a single byte store
//! and addressed by offset, so a presentation layer can list them cheaply
//! and load any one of them back on demand.
//!
//! # Example
//!
//! ```
//! use netsieve_core::{ObjectType, ProtocolObject};
//! use netsieve_storage::ObjectLog;
//!
//! let log = ObjectLog::in_memory();
//! let mut obj = ProtocolObject::new(ObjectType::RawOutgoing);
//! let offset = log.append(&mut obj).unwrap();
//! assert_eq!(log.read(offset).unwrap().object_type(), ObjectType::RawOutgoing);
//! ```

pub mod backend;
pub mod error;
pub mod export;
pub mod log;

pub use backend::{FileBackend, LogBackend, MemoryBackend};
pub use error::{LogError, Result};
pub use export::{write_streams, ObjectExporter};
pub use log::{encode_record, LogRecord, ObjectLog, Records};
