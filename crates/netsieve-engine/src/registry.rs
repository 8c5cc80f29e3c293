//! Live connection table.

use std::collections::HashMap;
use std::net::SocketAddr;

use netsieve_core::FilterConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chain::{ConnectionFilterChain, Direction};

/// What the driver reports about a new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub direction: Direction,
    pub process_id: u32,
    pub process_name: String,
    pub local: Option<SocketAddr>,
    pub remote: Option<SocketAddr>,
}

impl ConnectionInfo {
    pub fn outbound(process_id: u32, process_name: impl Into<String>) -> Self {
        Self {
            direction: Direction::Outbound,
            process_id,
            process_name: process_name.into(),
            local: None,
            remote: None,
        }
    }

    pub fn inbound(process_id: u32, process_name: impl Into<String>) -> Self {
        Self {
            direction: Direction::Inbound,
            ..Self::outbound(process_id, process_name)
        }
    }

    pub fn with_endpoints(mut self, local: SocketAddr, remote: SocketAddr) -> Self {
        self.local = Some(local);
        self.remote = Some(remote);
        self
    }
}

/// Session list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub connection_id: u64,
    pub info: ConnectionInfo,
    pub chain: ConnectionFilterChain,
}

/// Connections with an attached chain, keyed by connection id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<u64, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and stores the chain for a connection.
    ///
    /// Attaching an id that is already present replaces its entry.
    pub fn attach(
        &self,
        connection_id: u64,
        info: ConnectionInfo,
        config: &FilterConfig,
    ) -> ConnectionFilterChain {
        let chain = ConnectionFilterChain::build(connection_id, info.direction, config);
        info!(
            "Connection {} ({:?}, {} pid {}) attached with {} stages",
            connection_id,
            info.direction,
            info.process_name,
            info.process_id,
            chain.stages().len()
        );

        let entry = ConnectionEntry {
            connection_id,
            info,
            chain: chain.clone(),
        };
        if self.entries.lock().insert(connection_id, entry).is_some() {
            warn!("Connection {} was already attached; chain replaced", connection_id);
        }
        chain
    }

    /// Drops a connection's chain. Returns false if it was not attached.
    pub fn detach(&self, connection_id: u64) -> bool {
        let removed = self.entries.lock().remove(&connection_id).is_some();
        if removed {
            info!("Connection {} detached", connection_id);
        } else {
            debug!("Connection {} not attached, nothing to detach", connection_id);
        }
        removed
    }

    pub fn chain(&self, connection_id: u64) -> Option<ConnectionFilterChain> {
        self.entries
            .lock()
            .get(&connection_id)
            .map(|e| e.chain.clone())
    }

    pub fn info(&self, connection_id: u64) -> Option<ConnectionInfo> {
        self.entries
            .lock()
            .get(&connection_id)
            .map(|e| e.info.clone())
    }

    pub fn is_attached(&self, connection_id: u64) -> bool {
        self.entries.lock().contains_key(&connection_id)
    }

    /// Snapshot of the session list, ordered by connection id.
    pub fn connections(&self) -> Vec<ConnectionEntry> {
        let mut list: Vec<_> = self.entries.lock().values().cloned().collect();
        list.sort_by_key(|e| e.connection_id);
        list
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StageKind;

    #[test]
    fn test_attach_and_lookup() {
        let registry = ConnectionRegistry::new();
        let local: SocketAddr = "10.0.0.2:50000".parse().unwrap();
        let remote: SocketAddr = "93.184.216.34:80".parse().unwrap();
        let info = ConnectionInfo::outbound(42, "browser").with_endpoints(local, remote);

        let chain = registry.attach(7, info.clone(), &FilterConfig::default());
        assert!(chain.contains(StageKind::Http));
        assert_eq!(registry.chain(7), Some(chain));
        assert_eq!(registry.info(7), Some(info));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let registry = ConnectionRegistry::new();
        registry.attach(1, ConnectionInfo::outbound(1, "a"), &FilterConfig::default());
        registry.attach(2, ConnectionInfo::outbound(2, "b"), &FilterConfig::default());

        assert!(registry.detach(1));
        let after_once = registry.connections();
        assert!(!registry.detach(1));
        assert_eq!(registry.connections(), after_once);
        assert!(!registry.detach(99));
        assert_eq!(registry.len(), 1);
        assert!(registry.is_attached(2));
    }

    #[test]
    fn test_reattach_replaces() {
        let registry = ConnectionRegistry::new();
        registry.attach(5, ConnectionInfo::outbound(1, "a"), &FilterConfig::default());
        let chain = registry.attach(5, ConnectionInfo::inbound(1, "a"), &FilterConfig::default());
        assert!(chain.is_empty());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.info(5).unwrap().direction, Direction::Inbound);
    }

    #[test]
    fn test_connections_sorted() {
        let registry = ConnectionRegistry::new();
        for id in [30, 10, 20] {
            registry.attach(id, ConnectionInfo::outbound(id as u32, "p"), &FilterConfig::default());
        }
        let ids: Vec<u64> = registry.connections().iter().map(|e| e.connection_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }
}
