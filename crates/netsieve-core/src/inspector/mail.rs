//! Mail and news rules: recipient blocking outbound, subject tagging inbound.

use std::io::Write;

use crate::error::Result;
use crate::header::Header;
use crate::object::{ObjectType, ProtocolObject};
use crate::params::FilterConfig;

use super::{BlockReason, Inspection, InspectionRule};

/// Reply posted to the client when an outgoing message is rejected.
pub const REJECT_REPLY: &str = "554 Message blocked!\r\n";

/// Builds the raw SMTP/NNTP rejection object.
pub fn reject_reply() -> Result<ProtocolObject> {
    let mut obj = ProtocolObject::new(ObjectType::RawIncoming);
    obj.stream_mut(0usize)?.write_all(REJECT_REPLY.as_bytes())?;
    obj.rewind_all();
    Ok(obj)
}

/// Blocks outgoing mail and news posts addressed to a configured recipient.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutgoingMailRule;

impl InspectionRule for OutgoingMailRule {
    fn name(&self) -> &'static str {
        "outgoing-mail"
    }

    fn inspect(&self, object: &mut ProtocolObject, config: &FilterConfig) -> Result<Inspection> {
        if config.block_address.is_empty() {
            return Ok(Inspection::allow());
        }

        let header = Header::read_from(object.stream(0usize)?);
        let Some(recipients) = header.get("To").or_else(|| header.get("Newsgroups")) else {
            return Ok(Inspection::allow());
        };

        // Only the recipient side is lower-cased; the configured address is used as given.
        if recipients.to_lowercase().contains(&config.block_address) {
            tracing::debug!("Outgoing message to {} matches blocked address", recipients);
            return Ok(Inspection::block(
                BlockReason::BlockedAddress,
                Some(reject_reply()?),
            ));
        }

        Ok(Inspection::allow())
    }
}

/// Prepends the configured prefix to the subject of incoming mail and articles.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncomingMailRule;

fn find_body_start(message: &[u8]) -> Option<usize> {
    message
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

impl InspectionRule for IncomingMailRule {
    fn name(&self) -> &'static str {
        "incoming-mail"
    }

    fn inspect(&self, object: &mut ProtocolObject, config: &FilterConfig) -> Result<Inspection> {
        if config.mail_prefix.is_empty() {
            return Ok(Inspection::allow());
        }

        let message = object.stream(0usize)?.as_bytes().to_vec();
        let mut header = Header::parse(&message);
        let Some(subject) = header.get("Subject").map(str::to_string) else {
            return Ok(Inspection::allow());
        };
        let Some(body_start) = find_body_start(&message) else {
            return Ok(Inspection::allow());
        };

        header.remove("Subject");
        header.add("Subject", format!("{} {}", config.mail_prefix, subject));

        let stream = object.stream_mut(0usize)?;
        header.write_to(stream)?;
        stream.write_all(&message[body_start..])?;
        stream.rewind();

        Ok(Inspection::rewritten())
    }
}
