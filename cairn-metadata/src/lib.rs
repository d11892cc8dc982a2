//! Cairn Metadata Registry
//!
//! Tracks which files name which blocks and which blocks decompose into
//! which shards, persisted through a key-value store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      Registry                        │
//! │                                                      │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────────────┐  │
//! │  │  Index   │   │ Catalog  │   │    Blocktree     │  │
//! │  │ name→blk │   │ blk→meta │   │ blk→[shard, ...] │  │
//! │  └──────────┘   └──────────┘   └──────────────────┘  │
//! │        │              │                 │            │
//! │        └──────────────┼─────────────────┘            │
//! │                       ▼                              │
//! │                ┌────────────┐    ┌───────────────┐   │
//! │                │  KvStore   │    │ PeerDirectory │   │
//! │                └────────────┘    └───────────────┘   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use cairn_metadata::Registry;
//!
//! let registry = Registry::open(store, directory)?;
//!
//! // Handshake for a new block
//! let peers = registry.peers_available_to_host(&metadata, Some(&self_id)).await?;
//!
//! // Once every upload has landed, name it
//! registry.record(&metadata)?;
//!
//! // Later: where does "a.txt" live?
//! let root = registry.resolve("a.txt")?;
//! let shards = registry.lookup_shards(&root);
//! ```

pub mod models;

pub use models::{Blocktree, Catalog, Index, Registration, RegistryState};

use cairn_core::block::BlockMetadata;
use cairn_core::checksum::Checksum;
use cairn_core::error::{CairnError, Result};
use cairn_network::{PeerDirectory, PeerHandle, PeerId};
use cairn_storage::kv::{get_value, put_value, KvStore};
use futures::future::join_all;
use models::{BLOCKTREE_KEY, CATALOG_KEY, INDEX_KEY};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Timeout for asking a peer whether it holds a block
    pub query_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Index, catalog, and blocktree, loaded at open and flushed on every mutation
pub struct Registry {
    store: Arc<dyn KvStore>,
    directory: Arc<dyn PeerDirectory>,
    state: Mutex<RegistryState>,
    config: RegistryConfig,
}

impl Registry {
    /// Load the registry from `store`
    pub fn open(store: Arc<dyn KvStore>, directory: Arc<dyn PeerDirectory>) -> Result<Self> {
        Self::with_config(store, directory, RegistryConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn KvStore>,
        directory: Arc<dyn PeerDirectory>,
        config: RegistryConfig,
    ) -> Result<Self> {
        let state = RegistryState {
            index: get_value(store.as_ref(), INDEX_KEY)?.unwrap_or_default(),
            catalog: get_value(store.as_ref(), CATALOG_KEY)?.unwrap_or_default(),
            blocktree: get_value(store.as_ref(), BLOCKTREE_KEY)?.unwrap_or_default(),
        };

        info!(
            files = state.index.len(),
            blocks = state.catalog.len(),
            trees = state.blocktree.len(),
            "Registry loaded"
        );

        Ok(Self {
            store,
            directory,
            state: Mutex::new(state),
            config,
        })
    }

    /// Write every map back to the store
    fn flush(&self, state: &RegistryState) -> Result<()> {
        put_value(self.store.as_ref(), INDEX_KEY, &state.index)?;
        put_value(self.store.as_ref(), CATALOG_KEY, &state.catalog)?;
        put_value(self.store.as_ref(), BLOCKTREE_KEY, &state.blocktree)?;
        Ok(())
    }

    /// Apply `mutate` to a copy of the state, flush the copy, then swap it in.
    ///
    /// The lock is held throughout, so each mutation is one critical section.
    /// On a failed flush the in-memory state is untouched and the previous
    /// maps are written back.
    fn commit<T>(&self, mutate: impl FnOnce(&mut RegistryState) -> T) -> Result<T> {
        let mut state = self.state.lock();
        let mut next = state.clone();
        let outcome = mutate(&mut next);

        if let Err(e) = self.flush(&next) {
            if let Err(restore) = self.flush(&state) {
                warn!(error = %restore, "Failed to restore registry after a failed flush");
            }
            return Err(e);
        }

        *state = next;
        Ok(outcome)
    }

    /// The directory peer queries are delegated to
    pub fn directory(&self) -> &Arc<dyn PeerDirectory> {
        &self.directory
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    /// Root block checksum of a named file
    pub fn resolve(&self, filename: &str) -> Result<Checksum> {
        self.state
            .lock()
            .index
            .get(filename)
            .copied()
            .ok_or_else(|| CairnError::NotFound(format!("file {}", filename)))
    }

    /// Metadata of a known block
    pub fn catalog_lookup(&self, checksum: &Checksum) -> Result<BlockMetadata> {
        self.state
            .lock()
            .catalog
            .get(checksum)
            .cloned()
            .ok_or_else(|| CairnError::NotFound(format!("block {}", checksum)))
    }

    /// Ordered shard checksums of a block, empty if it was never split
    pub fn lookup_shards(&self, checksum: &Checksum) -> Vec<Checksum> {
        self.state
            .lock()
            .blocktree
            .get(checksum)
            .cloned()
            .unwrap_or_default()
    }

    /// Every named file with its root block, sorted by name
    pub fn files(&self) -> Vec<(String, Checksum)> {
        self.state
            .lock()
            .index
            .iter()
            .map(|(name, checksum)| (name.clone(), *checksum))
            .collect()
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Record a block in the catalog, and in the index if it is named
    pub fn record(&self, metadata: &BlockMetadata) -> Result<()> {
        let previous = self.commit(|state| {
            state.catalog.insert(metadata.checksum, metadata.clone());
            metadata
                .name
                .as_ref()
                .and_then(|name| state.index.insert(name.clone(), metadata.checksum))
        })?;

        if let Some(previous) = previous.filter(|p| *p != metadata.checksum) {
            warn!(
                name = %metadata.name(),
                previous = %previous,
                checksum = %metadata.checksum,
                "File name now points at a different block"
            );
        }
        debug!(checksum = %metadata.checksum, name = %metadata.name(), "Recorded block");
        Ok(())
    }

    /// Record the ordered shard layout of `root`.
    ///
    /// A different layout already on record is overwritten, never merged,
    /// and the conflict is logged.
    pub fn register_shards(&self, root: Checksum, shards: &[BlockMetadata]) -> Result<Registration> {
        let layout: Vec<Checksum> = shards.iter().map(|s| s.checksum).collect();
        let shard_count = layout.len();

        let (registration, previous_shards) = self.commit(|state| {
            for shard in shards {
                state.catalog.insert(shard.checksum, shard.clone());
            }
            let outcome = match state.blocktree.get(&root) {
                None => (Registration::Created, 0),
                Some(existing) if *existing == layout => (Registration::Unchanged, existing.len()),
                Some(existing) => (Registration::Replaced, existing.len()),
            };
            state.blocktree.insert(root, layout);
            outcome
        })?;

        if registration == Registration::Replaced {
            warn!(
                root = %root,
                previous_shards,
                shards = shard_count,
                "Registration conflict, replacing shard layout"
            );
        }
        debug!(root = %root, shards = shards.len(), %registration, "Registered shards");
        Ok(registration)
    }

    // =========================================================================
    // PEER QUERIES
    // =========================================================================

    /// Currently live peers
    pub async fn live_peers(&self) -> BTreeMap<PeerId, PeerHandle> {
        self.directory.discover().await
    }

    /// Peers that can host a new block, sorted by id.
    ///
    /// When at least one peer qualifies, the block is recorded in the
    /// catalog before returning. The index entry of a named block is left
    /// alone until `record` confirms the block once its uploads have landed.
    pub async fn peers_available_to_host(
        &self,
        metadata: &BlockMetadata,
        exclude: Option<&PeerId>,
    ) -> Result<Vec<PeerHandle>> {
        let peers: Vec<PeerHandle> = self
            .directory
            .discover()
            .await
            .into_iter()
            .filter(|(id, _)| Some(id) != exclude)
            .map(|(_, peer)| peer)
            .collect();

        if peers.is_empty() {
            return Err(CairnError::NotAvailable(format!(
                "no peer can host block {}",
                metadata.name()
            )));
        }

        self.commit(|state| {
            state.catalog.insert(metadata.checksum, metadata.clone());
        })?;
        debug!(checksum = %metadata.checksum, peers = peers.len(), "Offered block to peers");
        Ok(peers)
    }

    /// Live peers holding a block
    pub async fn hosting_peers(&self, checksum: &Checksum) -> Vec<PeerHandle> {
        self.locate(std::slice::from_ref(checksum))
            .await
            .remove(checksum)
            .unwrap_or_default()
    }

    /// Live peers holding each of `checksums`.
    ///
    /// Discovery runs once; every peer is asked about every block
    /// concurrently. A peer that errors or stalls counts as not holding it,
    /// and one that is unreachable is reported to the directory.
    pub async fn locate(&self, checksums: &[Checksum]) -> BTreeMap<Checksum, Vec<PeerHandle>> {
        let peers = self.directory.discover().await;
        let timeout = self.config.query_timeout;

        let queries = checksums.iter().flat_map(|checksum| {
            peers.values().map(move |peer| async move {
                let held = match tokio::time::timeout(timeout, peer.contains(checksum)).await {
                    Ok(Ok(held)) => held,
                    Ok(Err(e)) => {
                        warn!(peer = %peer.id(), checksum = %checksum, error = %e, "Block query failed");
                        if e.is_retryable() {
                            self.directory.report_unavailable(peer.id());
                        }
                        false
                    }
                    Err(_) => {
                        warn!(peer = %peer.id(), checksum = %checksum, "Block query timed out");
                        self.directory.report_unavailable(peer.id());
                        false
                    }
                };
                (*checksum, peer.clone(), held)
            })
        });

        let mut hosts: BTreeMap<Checksum, Vec<PeerHandle>> =
            checksums.iter().map(|c| (*c, Vec::new())).collect();
        for (checksum, peer, held) in join_all(queries).await {
            if held {
                hosts.entry(checksum).or_default().push(peer);
            }
        }
        hosts
    }
}
