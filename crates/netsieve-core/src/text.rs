//! Byte-to-text decoding used by the inspection rules.

use std::io::Read;

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};

/// Decodes bytes one-to-one into chars (Latin-1).
pub fn decode_ansi(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Decodes UTF-8, replacing invalid sequences.
pub fn decode_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decodes UTF-16LE; a trailing odd byte is ignored.
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Reads a native-endian `i32` from the start of `bytes`.
///
/// Fewer than four bytes fill the low-address end of a zeroed value.
pub fn read_i32(bytes: &[u8]) -> i32 {
    let mut head = [0u8; 4];
    let n = bytes.len().min(4);
    head[..n].copy_from_slice(&bytes[..n]);
    i32::from_ne_bytes(head)
}

/// Content encodings understood by [`inflate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    /// Maps a `Content-Encoding` header value; unknown codings are `Identity`.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "gzip" || v == "x-gzip" => Self::Gzip,
            Some(v) if v == "deflate" => Self::Deflate,
            _ => Self::Identity,
        }
    }
}

/// Inflates a possibly truncated body.
///
/// Whatever decodes before the first error is returned, so a partial
/// compressed prefix still yields searchable text.
pub fn inflate(bytes: &[u8], encoding: ContentEncoding) -> Vec<u8> {
    match encoding {
        ContentEncoding::Identity => bytes.to_vec(),
        ContentEncoding::Gzip => drain(GzDecoder::new(bytes)),
        ContentEncoding::Deflate => {
            // "deflate" is zlib-wrapped per RFC; some servers send raw deflate.
            let zlib = drain(ZlibDecoder::new(bytes));
            if zlib.is_empty() {
                drain(DeflateDecoder::new(bytes))
            } else {
                zlib
            }
        }
    }
}

fn drain(mut reader: impl Read) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) => {
                tracing::debug!("Stopped inflating after {} bytes: {}", out.len(), e);
                break;
            }
        }
    }
    out
}
