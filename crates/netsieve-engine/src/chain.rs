//! Per-connection protocol stage chains.
//!
//! A chain is built once when a connection is established and lists the
//! protocol decoders data passes through, in order. A later stage only
//! sees data an earlier stage has already approved or transformed.

use netsieve_core::FilterConfig;
use serde::{Deserialize, Serialize};

/// Which side initiated a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Protocol decoder kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Proxy,
    Tls,
    Http,
    Smtp,
    Pop3,
    Nntp,
    Ftp,
    Im,
    Xmpp,
    Raw,
}

/// Stage-specific behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    /// Decode TLS inside this stage.
    pub ssl_tls: bool,
    /// Incoming objects are observed but not rewritten.
    pub read_only_in: bool,
    /// Outgoing objects are observed but not rewritten.
    pub read_only_out: bool,
}

impl StageFlags {
    pub const NONE: Self = Self {
        ssl_tls: false,
        read_only_in: false,
        read_only_out: false,
    };

    fn ssl(enabled: bool) -> Self {
        Self {
            ssl_tls: enabled,
            ..Self::NONE
        }
    }

    fn read_only(self) -> Self {
        Self {
            read_only_in: true,
            read_only_out: true,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStage {
    pub kind: StageKind,
    pub flags: StageFlags,
}

impl FilterStage {
    fn new(kind: StageKind, flags: StageFlags) -> Self {
        Self { kind, flags }
    }
}

/// Ordered stage list attached to one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionFilterChain {
    connection_id: u64,
    direction: Direction,
    stages: Vec<FilterStage>,
}

impl ConnectionFilterChain {
    /// Builds the chain for a new connection from a parameter snapshot.
    ///
    /// Inbound connections get an empty chain.
    pub fn build(connection_id: u64, direction: Direction, config: &FilterConfig) -> Self {
        let mut stages = Vec::new();

        if direction == Direction::Outbound {
            let ssl = config.filter_ssl;

            stages.push(FilterStage::new(StageKind::Proxy, StageFlags::NONE));
            if ssl {
                stages.push(FilterStage::new(StageKind::Tls, StageFlags::NONE));
            }
            stages.push(FilterStage::new(StageKind::Http, StageFlags::NONE));
            stages.push(FilterStage::new(StageKind::Smtp, StageFlags::ssl(ssl)));
            stages.push(FilterStage::new(StageKind::Pop3, StageFlags::ssl(ssl)));
            stages.push(FilterStage::new(StageKind::Nntp, StageFlags::ssl(ssl)));
            stages.push(FilterStage::new(StageKind::Ftp, StageFlags::ssl(ssl).read_only()));
            stages.push(FilterStage::new(StageKind::Im, StageFlags::NONE));
            stages.push(FilterStage::new(StageKind::Xmpp, StageFlags::ssl(ssl).read_only()));
            if config.filter_raw {
                stages.push(FilterStage::new(StageKind::Raw, StageFlags::NONE));
            }
        }

        Self {
            connection_id,
            direction,
            stages,
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind).collect()
    }

    pub fn stage(&self, kind: StageKind) -> Option<&FilterStage> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    pub fn contains(&self, kind: StageKind) -> bool {
        self.stage(kind).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StageKind::*;

    #[test]
    fn test_default_outbound_order() {
        let chain = ConnectionFilterChain::build(1, Direction::Outbound, &FilterConfig::default());
        assert_eq!(chain.kinds(), vec![Proxy, Http, Smtp, Pop3, Nntp, Ftp, Im, Xmpp]);
        assert!(!chain.stage(Smtp).unwrap().flags.ssl_tls);
    }

    #[test]
    fn test_ssl_and_raw_enabled() {
        let config = FilterConfig {
            filter_ssl: true,
            filter_raw: true,
            ..FilterConfig::default()
        };
        let chain = ConnectionFilterChain::build(2, Direction::Outbound, &config);
        assert_eq!(
            chain.kinds(),
            vec![Proxy, Tls, Http, Smtp, Pop3, Nntp, Ftp, Im, Xmpp, Raw]
        );
        for kind in [Smtp, Pop3, Nntp, Ftp, Xmpp] {
            assert!(chain.stage(kind).unwrap().flags.ssl_tls, "{:?}", kind);
        }
        assert!(!chain.stage(Http).unwrap().flags.ssl_tls);
        assert!(!chain.stage(Tls).unwrap().flags.ssl_tls);
    }

    #[test]
    fn test_read_only_stages() {
        let chain = ConnectionFilterChain::build(3, Direction::Outbound, &FilterConfig::default());
        let ftp = chain.stage(Ftp).unwrap().flags;
        assert!(ftp.read_only_in && ftp.read_only_out);
        let xmpp = chain.stage(Xmpp).unwrap().flags;
        assert!(xmpp.read_only_in && xmpp.read_only_out);
        assert_eq!(chain.stage(Im).unwrap().flags, StageFlags::NONE);
        assert_eq!(chain.stage(Http).unwrap().flags, StageFlags::NONE);
    }

    #[test]
    fn test_inbound_is_empty() {
        let config = FilterConfig {
            filter_ssl: true,
            filter_raw: true,
            ..FilterConfig::default()
        };
        let chain = ConnectionFilterChain::build(4, Direction::Inbound, &config);
        assert!(chain.is_empty());
        assert_eq!(chain.direction(), Direction::Inbound);
        assert_eq!(chain.connection_id(), 4);
    }
}
