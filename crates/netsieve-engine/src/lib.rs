//! Netsieve Engine - per-connection filtering.
//!
//! [`FilterEngine`] is the surface a traffic driver calls into:
//!
//! - `on_connection_established` / `on_connection_closed` attach and drop
//!   a [`ConnectionFilterChain`]
//! - `on_partial_object` answers with a [`Disposition`] while an object is
//!   still arriving
//! - `on_object` inspects a complete object, posts it (or its replacement)
//!   through the [`ObjectSink`], and appends it to the object log
//!
//! Every evaluation fails open: an internal fault never blocks traffic.

pub mod chain;
pub mod engine;
pub mod error;
pub mod partial;
pub mod registry;

pub use chain::{ConnectionFilterChain, Direction, FilterStage, StageFlags, StageKind};
pub use engine::{EngineConfig, FilterEngine, LoggedObject, ObjectSink, OnLoggedCallback};
pub use error::{EngineError, Result};
pub use partial::{Disposition, PartialDataStateMachine, PartialDecision};
pub use registry::{ConnectionEntry, ConnectionInfo, ConnectionRegistry};
