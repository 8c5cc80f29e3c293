//! Per-object-type content inspection rules.
//!
//! The inspector keeps one rule per [`ObjectType`] in a lookup table. Adding
//! a protocol means registering a new [`InspectionRule`] for its types.
//!
//! ## Rule sets
//!
//! | Object types | Rule |
//! |---|---|
//! | HTTP response | [`http::HttpResponseRule`] |
//! | HTTP request | [`http::HttpRequestRule`] |
//! | SMTP outgoing, NNTP post | [`mail::OutgoingMailRule`] |
//! | POP3 incoming, NNTP article | [`mail::IncomingMailRule`] |
//! | ICQ chat in/out | [`im::ChatMessageRule`] |
//!
//! Types without a rule are always allowed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::object::{ObjectType, ProtocolObject};
use crate::params::FilterConfig;

pub mod http;
pub mod im;
pub mod mail;

/// Why an object was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    UrlStopWord,
    HtmlStopWord,
    FlashContent,
    ImageContent,
    BlockedAddress,
    BlockedContact,
    BlockedText,
    FileTransfer,
}

impl BlockReason {
    /// Returns a human-readable name for this reason.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UrlStopWord => "URL stop word",
            Self::HtmlStopWord => "HTML stop word",
            Self::FlashContent => "Flash video",
            Self::ImageContent => "Image",
            Self::BlockedAddress => "Blocked recipient",
            Self::BlockedContact => "Blocked contact",
            Self::BlockedText => "Blocked message text",
            Self::FileTransfer => "File transfer",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of inspecting one object.
///
/// In-place rewrites are applied to the object handed to the rule; `injected`
/// carries a synthesized object the caller must post on the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inspection {
    /// The original must not be forwarded.
    pub blocked: bool,
    /// Which rule triggered the block.
    pub reason: Option<BlockReason>,
    /// The inspected object was modified in place.
    pub rewritten: bool,
    /// Object to post in place of (or in addition to) the original.
    pub injected: Option<ProtocolObject>,
}

impl Inspection {
    /// Allow unchanged.
    pub fn allow() -> Self {
        Self::default()
    }

    /// Block, optionally posting a replacement.
    pub fn block(reason: BlockReason, injected: Option<ProtocolObject>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason),
            rewritten: false,
            injected,
        }
    }

    /// Allow after an in-place rewrite.
    pub fn rewritten() -> Self {
        Self {
            rewritten: true,
            ..Self::default()
        }
    }
}

/// A rule set for one or more object types.
pub trait InspectionRule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Inspects a complete object, possibly rewriting it in place.
    fn inspect(&self, object: &mut ProtocolObject, config: &FilterConfig) -> Result<Inspection>;
}

/// Lookup table from object type to its inspection rule.
#[derive(Clone)]
pub struct ContentInspector {
    rules: HashMap<ObjectType, Arc<dyn InspectionRule>>,
}

impl std::fmt::Debug for ContentInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self
            .rules
            .iter()
            .map(|(t, r)| format!("{}={}", t, r.name()))
            .collect();
        names.sort();
        f.debug_struct("ContentInspector")
            .field("rules", &names)
            .finish()
    }
}

impl ContentInspector {
    /// Creates an inspector with no rules.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Creates an inspector with the standard rule sets registered.
    pub fn new() -> Self {
        let mut inspector = Self::empty();
        inspector.register(&[ObjectType::HttpResponse], Arc::new(http::HttpResponseRule));
        inspector.register(&[ObjectType::HttpRequest], Arc::new(http::HttpRequestRule));
        inspector.register(
            &[ObjectType::SmtpMailOutgoing, ObjectType::NntpPost],
            Arc::new(mail::OutgoingMailRule),
        );
        inspector.register(
            &[ObjectType::Pop3MailIncoming, ObjectType::NntpArticle],
            Arc::new(mail::IncomingMailRule),
        );
        inspector.register(
            &[
                ObjectType::IcqChatMessageOutgoing,
                ObjectType::IcqChatMessageIncoming,
            ],
            Arc::new(im::ChatMessageRule),
        );
        inspector
    }

    /// Registers `rule` for each of `types`, replacing earlier registrations.
    pub fn register(&mut self, types: &[ObjectType], rule: Arc<dyn InspectionRule>) {
        for t in types {
            self.rules.insert(*t, rule.clone());
        }
    }

    /// Returns the rule registered for `object_type`.
    pub fn rule_for(&self, object_type: ObjectType) -> Option<&dyn InspectionRule> {
        self.rules.get(&object_type).map(|r| r.as_ref())
    }

    /// Runs the rule for the object's type; unregistered types are allowed.
    pub fn inspect(&self, object: &mut ProtocolObject, config: &FilterConfig) -> Result<Inspection> {
        match self.rule_for(object.object_type()) {
            Some(rule) => {
                let result = rule.inspect(object, config)?;
                if result.blocked {
                    tracing::info!(
                        "Blocked {} by {} rule - reason: {:?}",
                        object.object_type(),
                        rule.name(),
                        result.reason
                    );
                }
                Ok(result)
            }
            None => Ok(Inspection::allow()),
        }
    }
}

impl Default for ContentInspector {
    fn default() -> Self {
        Self::new()
    }
}
