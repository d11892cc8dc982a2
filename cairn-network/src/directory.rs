//! Peer directory
//!
//! Discovery returns only peers that answered a ping within the timeout.
//! Peers that fail are pruned from the directory as a side effect, as are
//! peers a caller reports after a failed or stalled call.

use crate::peer::{PeerHandle, PeerId};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Liveness-filtered registry of storage peers
#[async_trait::async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Currently live peers, keyed and sorted by id
    async fn discover(&self) -> BTreeMap<PeerId, PeerHandle>;

    /// Drop a peer whose call failed or stalled
    fn report_unavailable(&self, id: &PeerId);
}

/// Configuration for the static directory
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Timeout for each liveness ping
    pub ping_timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_secs(2),
        }
    }
}

/// Directory over a fixed set of known peers
pub struct StaticDirectory {
    peers: RwLock<BTreeMap<PeerId, PeerHandle>>,
    config: DirectoryConfig,
}

impl StaticDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            peers: RwLock::new(BTreeMap::new()),
            config,
        }
    }

    /// Create a directory already holding `peers`
    pub fn with_peers(config: DirectoryConfig, peers: impl IntoIterator<Item = PeerHandle>) -> Self {
        let directory = Self::new(config);
        for peer in peers {
            directory.add(peer);
        }
        directory
    }

    /// Register a peer, replacing any peer with the same id
    pub fn add(&self, peer: PeerHandle) {
        info!(peer = %peer.id(), address = %peer.address(), "Peer registered");
        self.peers.write().insert(peer.id().clone(), peer);
    }

    /// Forget a peer
    pub fn remove(&self, id: &PeerId) -> Option<PeerHandle> {
        self.peers.write().remove(id)
    }

    /// Every registered peer, live or not
    pub fn known(&self) -> Vec<PeerId> {
        self.peers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

#[async_trait::async_trait]
impl PeerDirectory for StaticDirectory {
    async fn discover(&self) -> BTreeMap<PeerId, PeerHandle> {
        let candidates: Vec<PeerHandle> = self.peers.read().values().cloned().collect();
        let timeout = self.config.ping_timeout;

        let pings = candidates.into_iter().map(|peer| async move {
            let alive = tokio::time::timeout(timeout, peer.ping())
                .await
                .unwrap_or(false);
            (peer, alive)
        });
        let results = join_all(pings).await;

        let mut live = BTreeMap::new();
        for (peer, alive) in results {
            if alive {
                live.insert(peer.id().clone(), peer);
            } else {
                warn!(peer = %peer.id(), address = %peer.address(), "Peer unreachable, pruning");
                self.remove(peer.id());
            }
        }

        debug!(live = live.len(), "Discovered peers");
        live
    }

    fn report_unavailable(&self, id: &PeerId) {
        if self.remove(id).is_some() {
            warn!(peer = %id, "Peer call failed, pruning");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalPeer;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_discover_prunes_dead_peers() {
        let a = Arc::new(LocalPeer::in_memory("peer-a"));
        let b = Arc::new(LocalPeer::in_memory("peer-b"));
        let directory = StaticDirectory::with_peers(
            DirectoryConfig::default(),
            [a.clone() as PeerHandle, b.clone() as PeerHandle],
        );

        b.set_online(false);
        let live = directory.discover().await;
        assert_eq!(live.keys().cloned().collect::<Vec<_>>(), vec![PeerId::from("peer-a")]);
        assert_eq!(directory.known(), vec![PeerId::from("peer-a")]);

        // Pruned peers stay gone even after recovering
        b.set_online(true);
        assert_eq!(directory.discover().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_peer_counts_as_dead() {
        let slow = Arc::new(LocalPeer::in_memory("peer-slow"));
        slow.set_latency(Duration::from_secs(30));
        let directory = StaticDirectory::with_peers(
            DirectoryConfig {
                ping_timeout: Duration::from_millis(100),
            },
            [slow as PeerHandle, Arc::new(LocalPeer::in_memory("peer-fast")) as PeerHandle],
        );

        let live = directory.discover().await;
        assert_eq!(live.len(), 1);
        assert!(live.contains_key(&PeerId::from("peer-fast")));
    }

    #[tokio::test]
    async fn test_reported_peer_is_pruned() {
        let directory = StaticDirectory::with_peers(
            DirectoryConfig::default(),
            ["peer-a", "peer-b"]
                .into_iter()
                .map(|id| Arc::new(LocalPeer::in_memory(id)) as PeerHandle),
        );

        directory.report_unavailable(&PeerId::from("peer-a"));
        directory.report_unavailable(&PeerId::from("peer-unknown"));

        assert_eq!(directory.known(), vec![PeerId::from("peer-b")]);
        assert_eq!(directory.discover().await.len(), 1);
    }
}
