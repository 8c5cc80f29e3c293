//! `Name: value` header blocks shared by HTTP and mail objects.
//!
//! Parsing stops at the first empty line, so a whole mail message can be
//! handed in and only its header part is read. Serialization always ends
//! with the blank line that separates header from body.

use std::io::Write;

use crate::error::Result;
use crate::stream::Stream;

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    /// Value with folded continuation lines joined and outer whitespace trimmed.
    pub fn unfolded_value(&self) -> String {
        self.value
            .split("\r\n")
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// Ordered list of header fields with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    fields: Vec<HeaderField>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a header block. Lines without a colon are skipped.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut header = Self::new();
        for raw in bytes.split(|&b| b == b'\n') {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                break;
            }
            let line = String::from_utf8_lossy(raw);
            header.input_line(&line);
        }
        header
    }

    /// Reads the header from a stream's full content.
    pub fn read_from(stream: &Stream) -> Self {
        Self::parse(stream.as_bytes())
    }

    fn input_line(&mut self, line: &str) {
        if line.starts_with([' ', '\t']) {
            if let Some(last) = self.fields.last_mut() {
                last.value.push_str("\r\n");
                last.value.push_str(line);
            }
            return;
        }

        let Some(colon) = line.find(':') else {
            return;
        };
        if colon == 0 {
            return;
        }
        let value = line[colon + 1..].trim_start_matches([' ', '\t']);
        self.add(&line[..colon], value);
    }

    /// Appends a field.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(HeaderField {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Value of the first field named `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    /// Removes every field named `name`; returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(name));
        before - self.fields.len()
    }

    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serializes as `Name: value\r\n` lines followed by a blank line.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::with_capacity(self.fields.len() * 60);
        for field in &self.fields {
            out.push_str(&field.name);
            out.push_str(": ");
            out.push_str(&field.value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.into_bytes()
    }

    /// Replaces the stream content with the serialized header.
    ///
    /// The cursor is left after the header so a body can follow.
    pub fn write_to(&self, stream: &mut Stream) -> Result<()> {
        stream.reset();
        stream.write_all(&self.to_bytes())?;
        Ok(())
    }
}
