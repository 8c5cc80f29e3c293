//! IM chat rule.

use std::io::Write;

use crate::error::Result;
use crate::object::{ImStream, ImTextFormat, ObjectType, ProtocolObject};
use crate::params::FilterConfig;
use crate::text::{decode_ansi, decode_utf16le, decode_utf8, read_i32};

use super::{BlockReason, Inspection, InspectionRule};

/// Offset of the message terminator byte cleared in block responses.
pub const TERMINATOR_OFFSET: usize = 26;

/// Blocks chat messages by contact, text substring, or file transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatMessageRule;

fn contact_of(object: &ProtocolObject) -> Result<String> {
    Ok(decode_ansi(object.stream(ImStream::ContactUin)?.as_bytes()))
}

fn text_format_of(object: &ProtocolObject) -> Result<i32> {
    Ok(read_i32(object.stream(ImStream::TextFormat)?.as_bytes()))
}

fn text_of(object: &ProtocolObject, format: i32) -> Result<String> {
    let bytes = object.stream(ImStream::Text)?.as_bytes();
    let text = match ImTextFormat::from_raw(format) {
        Some(ImTextFormat::Ansi) => decode_ansi(bytes),
        Some(ImTextFormat::Utf8) => decode_utf8(bytes),
        Some(ImTextFormat::Utf16) => decode_utf16le(bytes),
        _ => String::new(),
    };
    Ok(text)
}

/// Builds the response posted in place of a blocked chat message.
///
/// Returns `None` for non-chat types and for payloads too short to carry
/// the terminator byte.
pub fn block_response(object: &ProtocolObject) -> Result<Option<ProtocolObject>> {
    let response_type = match object.object_type() {
        ObjectType::IcqChatMessageIncoming => ObjectType::IcqResponse,
        ObjectType::IcqChatMessageOutgoing => ObjectType::IcqRequest,
        _ => return Ok(None),
    };

    let mut payload = object.stream(ImStream::Raw)?.as_bytes().to_vec();
    if payload.len() <= TERMINATOR_OFFSET {
        tracing::debug!("Chat payload of {} bytes too short for block response", payload.len());
        return Ok(None);
    }
    payload[TERMINATOR_OFFSET] = 0;

    let mut response = ProtocolObject::with_streams(response_type, 1);
    response.stream_mut(0usize)?.write_all(&payload)?;
    response.rewind_all();
    Ok(Some(response))
}

impl ChatMessageRule {
    fn block(object: &ProtocolObject, reason: BlockReason) -> Result<Inspection> {
        Ok(Inspection::block(reason, block_response(object)?))
    }
}

impl InspectionRule for ChatMessageRule {
    fn name(&self) -> &'static str {
        "im-chat"
    }

    fn inspect(&self, object: &mut ProtocolObject, config: &FilterConfig) -> Result<Inspection> {
        if !config.block_im_contact.is_empty() && contact_of(object)? == config.block_im_contact {
            return Self::block(object, BlockReason::BlockedContact);
        }

        if config.block_im_text.is_empty() && !config.block_im_file_transfers {
            return Ok(Inspection::allow());
        }

        let format = text_format_of(object)?;

        if !config.block_im_text.is_empty() {
            let text = text_of(object, format)?.to_lowercase();
            if text.contains(&config.block_im_text.to_lowercase()) {
                return Self::block(object, BlockReason::BlockedText);
            }
        }

        if config.block_im_file_transfers
            && ImTextFormat::from_raw(format) == Some(ImTextFormat::FileTransfer)
        {
            return Self::block(object, BlockReason::FileTransfer);
        }

        Ok(Inspection::allow())
    }
}
