//! Local simulated cluster
//!
//! Wires in-process peers, a static directory, and the registry together
//! so a node can run every scheme without a network.

use crate::config::NodeConfig;
use crate::scheme::SchemeEngine;
use cairn_core::error::Result;
use cairn_metadata::{Registry, RegistryConfig};
use cairn_network::{DirectoryConfig, LocalPeer, PeerHandle, PeerId, PeerTransport, StaticDirectory};
use cairn_storage::kv::KvStore;
use cairn_storage::memory::MemoryKvStore;
use cairn_storage::sled_backend::SledStore;
use cairn_storage::StorageConfig;
use std::sync::Arc;
use tracing::info;

/// Peers, directory, and registry of one node
pub struct LocalCluster {
    peers: Vec<Arc<LocalPeer>>,
    directory: Arc<StaticDirectory>,
    registry: Arc<Registry>,
}

impl LocalCluster {
    /// Open the configured peers and registry under `node.data_dir`, backed by sled
    pub fn open(config: &NodeConfig) -> Result<Self> {
        let data_dir = &config.node.data_dir;

        let peers = config
            .network
            .peers
            .iter()
            .map(|entry| -> Result<Arc<LocalPeer>> {
                let store = SledStore::open(&StorageConfig::new(data_dir.join("peers").join(&entry.id)))?;
                Ok(Arc::new(LocalPeer::new(
                    entry.id.as_str(),
                    entry.address.clone(),
                    Arc::new(store),
                )))
            })
            .collect::<Result<Vec<_>>>()?;

        let registry_store = SledStore::open(&StorageConfig::new(data_dir.join("registry")))?;

        let cluster = Self::assemble(
            peers,
            Arc::new(registry_store),
            DirectoryConfig {
                ping_timeout: config.network.ping_timeout(),
            },
            RegistryConfig {
                query_timeout: config.network.rpc_timeout(),
            },
        )?;

        info!(
            data_dir = ?data_dir,
            peers = cluster.peers.len(),
            "Local cluster opened"
        );
        Ok(cluster)
    }

    /// In-memory peers with the given ids and an in-memory registry
    pub fn in_memory<I>(ids: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<PeerId>,
    {
        let peers = ids
            .into_iter()
            .map(|id| Arc::new(LocalPeer::in_memory(id)))
            .collect();
        Self::assemble(
            peers,
            Arc::new(MemoryKvStore::new()),
            DirectoryConfig::default(),
            RegistryConfig::default(),
        )
    }

    /// `count` in-memory peers named `peer-0`, `peer-1`, ...
    pub fn with_peer_count(count: usize) -> Result<Self> {
        Self::in_memory((0..count).map(|i| format!("peer-{}", i)))
    }

    fn assemble(
        peers: Vec<Arc<LocalPeer>>,
        registry_store: Arc<dyn KvStore>,
        directory_config: DirectoryConfig,
        registry_config: RegistryConfig,
    ) -> Result<Self> {
        let directory = Arc::new(StaticDirectory::with_peers(
            directory_config,
            peers.iter().map(|p| p.clone() as PeerHandle),
        ));
        let registry = Registry::with_config(registry_store, directory.clone(), registry_config)?;

        Ok(Self {
            peers,
            directory,
            registry: Arc::new(registry),
        })
    }

    /// Engine running the configured scheme as the configured node
    pub fn engine(&self, config: &NodeConfig) -> SchemeEngine {
        let engine = SchemeEngine::new(
            config.scheme.to_scheme(),
            self.registry.clone(),
            config.node.name.as_str(),
        )
        .with_rpc_timeout(config.network.rpc_timeout());

        match config.scheme.seed {
            Some(seed) => engine.with_seed(seed),
            None => engine,
        }
    }

    pub fn peers(&self) -> &[Arc<LocalPeer>] {
        &self.peers
    }

    /// Look up a peer by id
    pub fn peer(&self, id: &str) -> Option<&Arc<LocalPeer>> {
        self.peers.iter().find(|p| p.id().as_str() == id)
    }

    pub fn directory(&self) -> &Arc<StaticDirectory> {
        &self.directory
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}
