//! Netsieve Core - protocol objects, filter parameters, and inspection rules.
//!
//! This crate holds everything the filter engine needs to judge a single
//! application-layer object:
//!
//! - [`Stream`] and [`ProtocolObject`]: typed bundles of byte streams
//! - [`Header`]: the `Name: value` header codec shared by HTTP and mail
//! - [`FilterParameters`]: the shared, lock-guarded parameter set
//! - [`ContentInspector`]: per-type rules deciding allow, block, or rewrite
//! - [`ObjectSummary`]: short descriptions for listings
//!
//! # Example
//!
//! ```
//! use netsieve_core::{ContentInspector, FilterConfig, ObjectType, ProtocolObject, Stream};
//!
//! let config = FilterConfig {
//!     block_address: "spam@example.com".into(),
//!     ..FilterConfig::default()
//! };
//! let mut mail = ProtocolObject::from_streams(
//!     ObjectType::SmtpMailOutgoing,
//!     vec![Stream::from_bytes(b"To: spam@example.com\r\n\r\nhello".to_vec())],
//! );
//!
//! let result = ContentInspector::new().inspect(&mut mail, &config).unwrap();
//! assert!(result.blocked);
//! ```

pub mod error;
pub mod header;
pub mod inspector;
pub mod object;
pub mod params;
pub mod stream;
pub mod summary;
pub mod text;

pub use error::{FilterError, Result};
pub use header::{Header, HeaderField};
pub use inspector::{BlockReason, ContentInspector, Inspection, InspectionRule};
pub use object::{HttpStream, ImStream, ImTextFormat, ObjectType, ProtocolObject};
pub use params::{FilterConfig, FilterParameters, ParamKey, ParamValue};
pub use stream::Stream;
pub use summary::{Category, ObjectSummary};
