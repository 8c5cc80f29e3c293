//! Decisions on objects that are still arriving.
//!
//! The driver calls [`PartialDataStateMachine::evaluate`] each time more
//! bytes of the same object are buffered. An object may come back
//! [`Disposition::MoreDataRequired`] several times before any other answer.

use std::sync::Arc;

use netsieve_core::inspector::http::{content_type, is_html, SNIFF_LEN};
use netsieve_core::{
    BlockReason, ContentInspector, FilterConfig, HttpStream, ObjectType, ProtocolObject,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// What the driver should do with a partially received object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Not enough bytes to decide; ask again with more.
    MoreDataRequired,
    /// Hold the object and deliver it complete for inspection.
    Filter,
    /// Forward as it arrives and deliver a read-only copy when complete.
    FilterReadOnly,
    /// Stop inspecting; forward the rest untouched.
    Bypass,
    /// Drop the transfer; a replacement has been posted.
    Block,
    /// The buffered part was rewritten; forward it and bypass the rest.
    UpdateAndBypass,
    /// The buffered part was rewritten; complete it read-only.
    UpdateAndFilterReadOnly,
}

impl Disposition {
    /// Value used when evaluation fails.
    pub const FAIL_OPEN: Self = Self::FilterReadOnly;
}

/// Result of one partial evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialDecision {
    pub disposition: Disposition,
    pub reason: Option<BlockReason>,
    /// Replacement to post when blocking.
    pub injected: Option<ProtocolObject>,
}

impl PartialDecision {
    fn of(disposition: Disposition) -> Self {
        Self {
            disposition,
            reason: None,
            injected: None,
        }
    }
}

/// Maps partial objects to dispositions using the full-object rules.
#[derive(Debug, Clone)]
pub struct PartialDataStateMachine {
    inspector: Arc<ContentInspector>,
}

impl PartialDataStateMachine {
    pub fn new(inspector: Arc<ContentInspector>) -> Self {
        Self { inspector }
    }

    /// Decides the disposition of a partial object.
    pub fn evaluate(
        &self,
        object: &mut ProtocolObject,
        config: &FilterConfig,
    ) -> Result<PartialDecision> {
        let decision = match object.object_type() {
            ObjectType::HttpResponse => self.evaluate_response(object, config)?,
            ObjectType::HttpRequest => self.evaluate_request(object, config)?,
            _ => PartialDecision::of(Disposition::FilterReadOnly),
        };
        debug!(
            "Partial {} -> {:?}",
            object.object_type(),
            decision.disposition
        );
        Ok(decision)
    }

    /// Like [`evaluate`](Self::evaluate), but any failure yields
    /// [`Disposition::FAIL_OPEN`].
    pub fn evaluate_or_default(
        &self,
        object: &mut ProtocolObject,
        config: &FilterConfig,
    ) -> PartialDecision {
        self.evaluate(object, config).unwrap_or_else(|e| {
            warn!(
                "Partial evaluation of {} failed, continuing read-only: {}",
                object.object_type(),
                e
            );
            PartialDecision::of(Disposition::FAIL_OPEN)
        })
    }

    fn evaluate_response(
        &self,
        object: &mut ProtocolObject,
        config: &FilterConfig,
    ) -> Result<PartialDecision> {
        if object.stream(HttpStream::Content)?.size() < SNIFF_LEN as u64 {
            return Ok(PartialDecision::of(Disposition::MoreDataRequired));
        }

        if let Some(blocked) = self.block_decision(object, config)? {
            return Ok(blocked);
        }

        let Some(content_type) = content_type(object) else {
            return Ok(PartialDecision::of(Disposition::FilterReadOnly));
        };
        if is_html(&content_type) && !config.html_stop_word.is_empty() {
            return Ok(PartialDecision::of(Disposition::Filter));
        }
        Ok(PartialDecision::of(Disposition::FilterReadOnly))
    }

    fn evaluate_request(
        &self,
        object: &mut ProtocolObject,
        config: &FilterConfig,
    ) -> Result<PartialDecision> {
        Ok(self
            .block_decision(object, config)?
            .unwrap_or_else(|| PartialDecision::of(Disposition::FilterReadOnly)))
    }

    fn block_decision(
        &self,
        object: &mut ProtocolObject,
        config: &FilterConfig,
    ) -> Result<Option<PartialDecision>> {
        let inspection = self.inspector.inspect(object, config)?;
        if !inspection.blocked {
            return Ok(None);
        }
        Ok(Some(PartialDecision {
            disposition: Disposition::Block,
            reason: inspection.reason,
            injected: inspection.injected,
        }))
    }
}

impl Default for PartialDataStateMachine {
    fn default() -> Self {
        Self::new(Arc::new(ContentInspector::new()))
    }
}
