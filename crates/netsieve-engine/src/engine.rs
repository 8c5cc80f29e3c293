//! Callback-facing filter engine.
//!
//! The driver reports connection events and objects through the `on_*`
//! methods; the engine answers with dispositions, posts replacement
//! objects through an [`ObjectSink`], and records every completed object
//! in the [`ObjectLog`].

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use netsieve_core::{
    BlockReason, ContentInspector, FilterParameters, ObjectSummary, ProtocolObject,
};
use netsieve_storage::{ObjectExporter, ObjectLog};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chain::ConnectionFilterChain;
use crate::error::Result;
use crate::partial::{Disposition, PartialDataStateMachine};
use crate::registry::{ConnectionEntry, ConnectionInfo, ConnectionRegistry};

/// Puts objects on the wire of a connection.
pub trait ObjectSink: Send + Sync {
    fn post_object(&self, connection_id: u64, object: ProtocolObject) -> Result<()>;
}

impl<F> ObjectSink for F
where
    F: Fn(u64, ProtocolObject) -> Result<()> + Send + Sync,
{
    fn post_object(&self, connection_id: u64, object: ProtocolObject) -> Result<()> {
        self(connection_id, object)
    }
}

/// Engine options that are not filter parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory receiving one `.bin` file per logged object.
    pub export_dir: Option<PathBuf>,
}

/// Notification sent after an object has been logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedObject {
    pub connection_id: u64,
    /// Log offset of the stored object.
    pub offset: u64,
    pub blocked: bool,
    pub reason: Option<BlockReason>,
    pub summary: ObjectSummary,
    pub logged_at: DateTime<Utc>,
}

/// Callback invoked for every logged object.
pub type OnLoggedCallback = Arc<dyn Fn(&LoggedObject) + Send + Sync>;

/// Content filter bound to one driver.
pub struct FilterEngine {
    params: FilterParameters,
    inspector: Arc<ContentInspector>,
    partial: PartialDataStateMachine,
    registry: ConnectionRegistry,
    log: Arc<ObjectLog>,
    sink: Arc<dyn ObjectSink>,
    exporter: Option<ObjectExporter>,
    on_logged: Vec<OnLoggedCallback>,
}

impl std::fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEngine")
            .field("inspector", &self.inspector)
            .field("connections", &self.registry.len())
            .field("log", &self.log)
            .field("exporter", &self.exporter)
            .field("on_logged", &self.on_logged.len())
            .finish()
    }
}

impl FilterEngine {
    /// Creates an engine with the standard inspection rules.
    pub fn new(
        params: FilterParameters,
        log: Arc<ObjectLog>,
        sink: Arc<dyn ObjectSink>,
        config: EngineConfig,
    ) -> Self {
        Self::with_inspector(params, log, sink, config, ContentInspector::new())
    }

    /// Creates an engine with a custom rule table.
    pub fn with_inspector(
        params: FilterParameters,
        log: Arc<ObjectLog>,
        sink: Arc<dyn ObjectSink>,
        config: EngineConfig,
        inspector: ContentInspector,
    ) -> Self {
        let inspector = Arc::new(inspector);
        Self {
            params,
            partial: PartialDataStateMachine::new(Arc::clone(&inspector)),
            inspector,
            registry: ConnectionRegistry::new(),
            log,
            sink,
            exporter: config.export_dir.map(ObjectExporter::new),
            on_logged: Vec::new(),
        }
    }

    /// Adds a callback run after each object is logged.
    pub fn on_logged<F>(mut self, callback: F) -> Self
    where
        F: Fn(&LoggedObject) + Send + Sync + 'static,
    {
        self.on_logged.push(Arc::new(callback));
        self
    }

    /// Parameter handle shared with the control surface.
    pub fn parameters(&self) -> &FilterParameters {
        &self.params
    }

    pub fn log(&self) -> &Arc<ObjectLog> {
        &self.log
    }

    /// Current session list.
    pub fn connections(&self) -> Vec<ConnectionEntry> {
        self.registry.connections()
    }

    pub fn chain(&self, connection_id: u64) -> Option<ConnectionFilterChain> {
        self.registry.chain(connection_id)
    }

    /// Attaches a filter chain built from the current parameters.
    pub fn on_connection_established(
        &self,
        connection_id: u64,
        info: ConnectionInfo,
    ) -> ConnectionFilterChain {
        let config = self.params.snapshot();
        self.registry.attach(connection_id, info, &config)
    }

    /// Drops the connection's chain and session entry. Safe to repeat.
    pub fn on_connection_closed(&self, connection_id: u64) {
        self.registry.detach(connection_id);
    }

    /// Decides how a partially received object proceeds.
    pub fn on_partial_object(&self, connection_id: u64, object: &mut ProtocolObject) -> Disposition {
        let config = self.params.snapshot();
        let decision = self.partial.evaluate_or_default(object, &config);

        if decision.disposition == Disposition::Block {
            info!(
                "Blocked partial {} on connection {} - reason: {:?}",
                object.object_type(),
                connection_id,
                decision.reason
            );
            if let Some(replacement) = decision.injected {
                self.post(connection_id, replacement);
            }
        }
        decision.disposition
    }

    /// Inspects a complete object, forwards or replaces it, and logs it.
    ///
    /// Inspection faults never block: the object is forwarded as received.
    /// The only error returned is a failure to append to the log.
    pub fn on_object(&self, connection_id: u64, object: &ProtocolObject) -> Result<LoggedObject> {
        let config = self.params.snapshot();
        let mut copy = object.detach();
        let mut blocked = false;
        let mut reason = None;

        if !copy.is_read_only() {
            match self.inspector.inspect(&mut copy, &config) {
                Ok(inspection) => {
                    blocked = inspection.blocked;
                    reason = inspection.reason;
                    if let Some(replacement) = inspection.injected {
                        self.post(connection_id, replacement);
                    }
                }
                Err(e) => warn!(
                    "Inspection of {} on connection {} failed, forwarding unchanged: {}",
                    copy.object_type(),
                    connection_id,
                    e
                ),
            }

            if !blocked {
                self.post(connection_id, copy.detach());
            }
        }

        let offset = self.log.append(&mut copy)?;
        debug!(
            "Object {} on connection {} logged at {} (blocked: {})",
            copy.object_type(),
            connection_id,
            offset,
            blocked
        );

        if let Some(exporter) = &self.exporter {
            if let Err(e) = exporter.export(connection_id, &copy) {
                warn!("Failed to export object from connection {}: {}", connection_id, e);
            }
        }

        let logged = LoggedObject {
            connection_id,
            offset,
            blocked,
            reason,
            summary: ObjectSummary::of(&copy),
            logged_at: Utc::now(),
        };
        for callback in &self.on_logged {
            callback(&logged);
        }
        Ok(logged)
    }

    fn post(&self, connection_id: u64, object: ProtocolObject) {
        let object_type = object.object_type();
        if let Err(e) = self.sink.post_object(connection_id, object) {
            warn!("Failed to post {} on connection {}: {}", object_type, connection_id, e);
        }
    }
}
