//! Shared filter configuration.
//!
//! [`FilterConfig`] is an immutable snapshot. [`FilterParameters`] is the
//! shared handle a control surface writes to and filter callbacks read from;
//! every access goes through one reader/writer lock, and writers replace the
//! snapshot instead of mutating it, so a callback that took a snapshot keeps
//! a consistent view for its whole evaluation.
//!
//! ```
//! use netsieve_core::params::{FilterParameters, ParamKey, ParamValue};
//!
//! let params = FilterParameters::new();
//! params.set(ParamKey::BlockImages, ParamValue::Bool(true)).unwrap();
//!
//! let snapshot = params.snapshot();
//! assert!(snapshot.block_images);
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};

/// Block page served when no body is configured.
pub const DEFAULT_BLOCK_PAGE: &str = "<html><body><h1>Blocked</h1>\
<p>This content was blocked by the network filter.</p></body></html>";

/// One immutable set of filtering parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Insert the TLS stage and decode TLS in mail/news/XMPP stages.
    pub filter_ssl: bool,
    /// Append the raw passthrough stage.
    pub filter_raw: bool,
    /// Substring that blocks an HTTP request by URL.
    pub url_stop_word: String,
    /// Substring that blocks an HTML response by body.
    pub html_stop_word: String,
    /// Body of the synthesized block page.
    pub block_page: String,
    /// URL substring that exempts HTTP traffic from blocking.
    pub skip_domain: String,
    /// Block GIF and JPEG responses.
    pub block_images: bool,
    /// Block FLV responses.
    pub block_flash: bool,
    /// Recipient substring that blocks outgoing mail and news posts.
    pub block_address: String,
    /// Prefix prepended to the subject of incoming mail and articles.
    pub mail_prefix: String,
    /// IM contact identifier to block.
    pub block_im_contact: String,
    /// IM message substring to block.
    pub block_im_text: String,
    /// Block IM file transfer messages.
    pub block_im_file_transfers: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_ssl: false,
            filter_raw: false,
            url_stop_word: String::new(),
            html_stop_word: String::new(),
            block_page: DEFAULT_BLOCK_PAGE.to_string(),
            skip_domain: String::new(),
            block_images: false,
            block_flash: false,
            block_address: String::new(),
            mail_prefix: String::new(),
            block_im_contact: String::new(),
            block_im_text: String::new(),
            block_im_file_transfers: false,
        }
    }
}

/// Closed set of parameter keys accepted by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamKey {
    SslFilter,
    RawPassthrough,
    UrlStopWord,
    HtmlStopWord,
    BlockPageBody,
    SkipDomain,
    BlockImages,
    BlockFlash,
    OutgoingBlockAddress,
    IncomingSubjectPrefix,
    ImBlockContact,
    ImBlockSubstring,
    ImBlockFileTransfers,
}

impl ParamKey {
    /// Every key, in declaration order.
    pub const ALL: [ParamKey; 13] = [
        Self::SslFilter,
        Self::RawPassthrough,
        Self::UrlStopWord,
        Self::HtmlStopWord,
        Self::BlockPageBody,
        Self::SkipDomain,
        Self::BlockImages,
        Self::BlockFlash,
        Self::OutgoingBlockAddress,
        Self::IncomingSubjectPrefix,
        Self::ImBlockContact,
        Self::ImBlockSubstring,
        Self::ImBlockFileTransfers,
    ];

    /// Returns the key's kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SslFilter => "ssl-filter",
            Self::RawPassthrough => "raw-passthrough",
            Self::UrlStopWord => "url-stop-word",
            Self::HtmlStopWord => "html-stop-word",
            Self::BlockPageBody => "block-page-body",
            Self::SkipDomain => "skip-domain",
            Self::BlockImages => "block-images",
            Self::BlockFlash => "block-flash",
            Self::OutgoingBlockAddress => "outgoing-block-address",
            Self::IncomingSubjectPrefix => "incoming-subject-prefix",
            Self::ImBlockContact => "im-block-contact",
            Self::ImBlockSubstring => "im-block-substring",
            Self::ImBlockFileTransfers => "im-block-file-transfers",
        }
    }

    /// Returns true if the key takes a boolean value.
    pub fn is_bool(&self) -> bool {
        matches!(
            self,
            Self::SslFilter
                | Self::RawPassthrough
                | Self::BlockImages
                | Self::BlockFlash
                | Self::ImBlockFileTransfers
        )
    }

    /// Parses a textual value into the type this key accepts.
    pub fn parse_value(&self, raw: &str) -> Result<ParamValue> {
        if !self.is_bool() {
            return Ok(ParamValue::Text(raw.to_string()));
        }
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(ParamValue::Bool(true)),
            "false" | "0" | "off" | "no" => Ok(ParamValue::Bool(false)),
            other => Err(FilterError::Decode(format!(
                "parameter {} expects a boolean, got {:?}",
                self, other
            ))),
        }
    }
}

impl std::fmt::Display for ParamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ParamKey {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| FilterError::Decode(format!("unknown parameter: {}", s)))
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Text(String),
}

impl FilterConfig {
    /// Returns the value stored for `key`.
    pub fn get(&self, key: ParamKey) -> ParamValue {
        match key {
            ParamKey::SslFilter => ParamValue::Bool(self.filter_ssl),
            ParamKey::RawPassthrough => ParamValue::Bool(self.filter_raw),
            ParamKey::UrlStopWord => ParamValue::Text(self.url_stop_word.clone()),
            ParamKey::HtmlStopWord => ParamValue::Text(self.html_stop_word.clone()),
            ParamKey::BlockPageBody => ParamValue::Text(self.block_page.clone()),
            ParamKey::SkipDomain => ParamValue::Text(self.skip_domain.clone()),
            ParamKey::BlockImages => ParamValue::Bool(self.block_images),
            ParamKey::BlockFlash => ParamValue::Bool(self.block_flash),
            ParamKey::OutgoingBlockAddress => ParamValue::Text(self.block_address.clone()),
            ParamKey::IncomingSubjectPrefix => ParamValue::Text(self.mail_prefix.clone()),
            ParamKey::ImBlockContact => ParamValue::Text(self.block_im_contact.clone()),
            ParamKey::ImBlockSubstring => ParamValue::Text(self.block_im_text.clone()),
            ParamKey::ImBlockFileTransfers => ParamValue::Bool(self.block_im_file_transfers),
        }
    }

    /// Stores `value` under `key`; the value type must match the key.
    pub fn set(&mut self, key: ParamKey, value: ParamValue) -> Result<()> {
        match (key, value) {
            (ParamKey::SslFilter, ParamValue::Bool(v)) => self.filter_ssl = v,
            (ParamKey::RawPassthrough, ParamValue::Bool(v)) => self.filter_raw = v,
            (ParamKey::UrlStopWord, ParamValue::Text(v)) => self.url_stop_word = v,
            (ParamKey::HtmlStopWord, ParamValue::Text(v)) => self.html_stop_word = v,
            (ParamKey::BlockPageBody, ParamValue::Text(v)) => self.block_page = v,
            (ParamKey::SkipDomain, ParamValue::Text(v)) => self.skip_domain = v,
            (ParamKey::BlockImages, ParamValue::Bool(v)) => self.block_images = v,
            (ParamKey::BlockFlash, ParamValue::Bool(v)) => self.block_flash = v,
            (ParamKey::OutgoingBlockAddress, ParamValue::Text(v)) => self.block_address = v,
            (ParamKey::IncomingSubjectPrefix, ParamValue::Text(v)) => self.mail_prefix = v,
            (ParamKey::ImBlockContact, ParamValue::Text(v)) => self.block_im_contact = v,
            (ParamKey::ImBlockSubstring, ParamValue::Text(v)) => self.block_im_text = v,
            (ParamKey::ImBlockFileTransfers, ParamValue::Bool(v)) => {
                self.block_im_file_transfers = v
            }
            (key, value) => {
                return Err(FilterError::Decode(format!(
                    "parameter {} does not accept {:?}",
                    key, value
                )))
            }
        }
        Ok(())
    }
}

/// Shared, thread-safe handle to the current [`FilterConfig`].
///
/// Clones share the same underlying store.
#[derive(Debug, Clone, Default)]
pub struct FilterParameters {
    current: Arc<RwLock<Arc<FilterConfig>>>,
}

impl FilterParameters {
    /// Creates a store holding the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `config`.
    pub fn with_config(config: FilterConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Returns the current snapshot. Take it once per callback.
    pub fn snapshot(&self) -> Arc<FilterConfig> {
        self.current.read().clone()
    }

    /// Replaces the whole configuration.
    pub fn replace(&self, config: FilterConfig) {
        *self.current.write() = Arc::new(config);
    }

    /// Applies `f` to a copy of the current configuration and publishes it.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut FilterConfig),
    {
        let mut guard = self.current.write();
        let mut next = FilterConfig::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    /// Sets one parameter.
    pub fn set(&self, key: ParamKey, value: ParamValue) -> Result<()> {
        let mut guard = self.current.write();
        let mut next = FilterConfig::clone(&guard);
        next.set(key, value)?;
        tracing::debug!("Filter parameter {} updated", key);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Reads one parameter, copied out of the store.
    pub fn get(&self, key: ParamKey) -> ParamValue {
        self.current.read().get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let cfg = FilterConfig::default();
        assert!(!cfg.filter_ssl);
        assert!(!cfg.block_images);
        assert!(cfg.html_stop_word.is_empty());
        assert_eq!(cfg.block_page, DEFAULT_BLOCK_PAGE);
    }

    #[test]
    fn set_and_get_every_key() {
        let mut cfg = FilterConfig::default();
        for key in ParamKey::ALL {
            let value = if key.is_bool() {
                ParamValue::Bool(true)
            } else {
                ParamValue::Text(format!("value-{}", key))
            };
            cfg.set(key, value.clone()).unwrap();
            assert_eq!(cfg.get(key), value);
        }
    }

    #[test]
    fn wrong_type_is_rejected() {
        let mut cfg = FilterConfig::default();
        let err = cfg.set(ParamKey::BlockImages, ParamValue::Text("yes".into()));
        assert!(matches!(err, Err(FilterError::Decode(_))));
        assert!(!cfg.block_images);
    }

    #[test]
    fn key_names_parse_back() {
        for key in ParamKey::ALL {
            assert_eq!(key.as_str().parse::<ParamKey>().unwrap(), key);
        }
        assert!("no-such-key".parse::<ParamKey>().is_err());
    }

    #[test]
    fn parse_value_follows_key_type() {
        assert_eq!(
            ParamKey::BlockFlash.parse_value("On").unwrap(),
            ParamValue::Bool(true)
        );
        assert_eq!(
            ParamKey::SslFilter.parse_value("0").unwrap(),
            ParamValue::Bool(false)
        );
        assert_eq!(
            ParamKey::SkipDomain.parse_value("true").unwrap(),
            ParamValue::Text("true".into())
        );
        assert!(ParamKey::BlockImages.parse_value("maybe").is_err());
    }

    #[test]
    fn snapshot_is_not_affected_by_later_writes() {
        let params = FilterParameters::new();
        let before = params.snapshot();
        params
            .set(ParamKey::HtmlStopWord, ParamValue::Text("bad".into()))
            .unwrap();
        assert!(before.html_stop_word.is_empty());
        assert_eq!(params.snapshot().html_stop_word, "bad");
    }

    #[test]
    fn clones_share_the_store() {
        let a = FilterParameters::new();
        let b = a.clone();
        a.update(|cfg| cfg.block_flash = true);
        assert_eq!(b.get(ParamKey::BlockFlash), ParamValue::Bool(true));
    }

    #[test]
    fn serde_round_trip_with_missing_fields() {
        let cfg: FilterConfig = serde_json::from_str(r#"{"block_images": true}"#).unwrap();
        assert!(cfg.block_images);
        assert_eq!(cfg.block_page, DEFAULT_BLOCK_PAGE);

        let json = serde_json::to_string(&cfg).unwrap();
        let back: FilterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn concurrent_writers_and_readers() {
        use std::thread;

        let params = FilterParameters::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let p = params.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        p.set(ParamKey::SkipDomain, ParamValue::Text(format!("d{}", i)))
                            .unwrap();
                        let snap = p.snapshot();
                        assert!(snap.skip_domain.starts_with('d'));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(params.snapshot().skip_domain.starts_with('d'));
    }
}
