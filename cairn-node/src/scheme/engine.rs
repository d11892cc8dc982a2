//! Scheme engine
//!
//! Store: HANDSHAKE -> SHARD/ENCODE -> STRIPE -> REGISTER.
//! Get: HANDSHAKE -> LOOKUP_SHARDS -> SAMPLE_AND_DOWNLOAD -> RECOVER -> VERIFY.
//!
//! Any failing step aborts the operation. Shard layouts and file names are
//! registered only once every upload of the stripe has landed, and nothing
//! is returned to the caller until the reassembled bytes hash to the
//! requested block.

use super::transfer::Transfer;
use super::{Pipeline, StorageScheme};
use bytes::Bytes;
use cairn_core::block::{Block, BlockMetadata};
use cairn_core::checksum::Checksum;
use cairn_core::error::{CairnError, Result};
use cairn_core::redundancy::{Redundancy, Replication};
use cairn_core::shard::ShardSet;
use cairn_core::striping::{download_itinerary, Allocator, Need, RoundRobin};
use cairn_metadata::{Registration, Registry};
use cairn_network::{PeerHandle, PeerId};
use futures::future::join_all;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A file handed to a scheme for storage
#[derive(Debug, Clone)]
pub struct File {
    pub name: Option<String>,
    pub data: Bytes,
}

impl File {
    pub fn named(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: Some(name.into()),
            data: data.into(),
        }
    }

    /// A file known only by the checksum of its contents
    pub fn unnamed(data: impl Into<Bytes>) -> Self {
        Self {
            name: None,
            data: data.into(),
        }
    }
}

/// Where one stored block landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Position in the stored layout
    pub position: usize,
    pub checksum: Checksum,
    pub peer: PeerId,
}

/// Outcome of a store
#[derive(Debug, Clone)]
pub struct StoreReceipt {
    /// Root block checksum
    pub checksum: Checksum,
    pub name: Option<String>,
    pub scheme: &'static str,
    /// Stored blocks in layout order
    pub placements: Vec<Placement>,
    /// Shard layout registration, for sharded schemes
    pub registration: Option<Registration>,
}

impl StoreReceipt {
    /// Distinct peers holding part of the file
    pub fn peers(&self) -> BTreeSet<PeerId> {
        self.placements.iter().map(|p| p.peer.clone()).collect()
    }
}

/// Drives one storage scheme against a registry and its peers
pub struct SchemeEngine {
    scheme: StorageScheme,
    registry: Arc<Registry>,
    local_id: PeerId,
    rng: Mutex<StdRng>,
    transfer: Transfer,
}

impl SchemeEngine {
    /// Create an engine; `local_id` is never offered as a host
    pub fn new(scheme: StorageScheme, registry: Arc<Registry>, local_id: impl Into<PeerId>) -> Self {
        let transfer = Transfer::default().with_directory(registry.directory().clone());
        Self {
            scheme,
            registry,
            local_id: local_id.into(),
            rng: Mutex::new(StdRng::from_entropy()),
            transfer,
        }
    }

    /// Make peer choice and shard sampling reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.transfer = self.transfer.with_timeout(timeout);
        self
    }

    pub fn scheme(&self) -> StorageScheme {
        self.scheme
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // =========================================================================
    // HANDSHAKES
    // =========================================================================

    /// Build the file's block and find the peers that can host it
    pub async fn store_handshake(&self, file: &File) -> Result<(Block, BlockMetadata, Vec<PeerHandle>)> {
        let block = Block::new(file.data.clone());
        let mut metadata = block.metadata();
        if let Some(name) = &file.name {
            metadata = metadata.with_name(name.clone());
        }

        let peers = self
            .registry
            .peers_available_to_host(&metadata, Some(&self.local_id))
            .await?;

        debug!(
            checksum = %block.checksum(),
            name = %metadata.name(),
            peers = peers.len(),
            "Store handshake complete"
        );
        Ok((block, metadata, peers))
    }

    /// Resolve a file name, or the hex checksum of a known block
    pub fn get_handshake(&self, target: &str) -> Result<Checksum> {
        match self.registry.resolve(target) {
            Ok(checksum) => Ok(checksum),
            Err(CairnError::NotFound(reason)) => Checksum::from_hex(target)
                .ok()
                .filter(|checksum| self.registry.catalog_lookup(checksum).is_ok())
                .ok_or(CairnError::NotFound(reason)),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // STORE
    // =========================================================================

    /// Store a file under this engine's scheme.
    ///
    /// The file's name points at the new block only after the store succeeds;
    /// a failed store leaves any earlier file of the same name reachable.
    pub async fn store(&self, file: File) -> Result<StoreReceipt> {
        let (block, metadata, peers) = self.store_handshake(&file).await?;

        let (placements, registration) = match self.scheme {
            StorageScheme::Hosting => (self.store_hosted(&block, &metadata, peers).await?, None),
            StorageScheme::NaiveDuplication { n } => {
                (self.store_copies(&block, &metadata, peers, n).await?, None)
            }
            _ => {
                let (placements, registration) = self.store_sharded(&block, &metadata, peers).await?;
                (placements, Some(registration))
            }
        };
        self.registry.record(&metadata)?;

        info!(
            checksum = %block.checksum(),
            name = %metadata.name(),
            scheme = self.scheme.name(),
            blocks = placements.len(),
            "Stored file"
        );

        Ok(StoreReceipt {
            checksum: block.checksum(),
            name: file.name,
            scheme: self.scheme.name(),
            placements,
            registration,
        })
    }

    async fn store_hosted(
        &self,
        block: &Block,
        metadata: &BlockMetadata,
        peers: Vec<PeerHandle>,
    ) -> Result<Vec<Placement>> {
        let (chosen, spares) = self.select_peers(peers, 1);
        let candidates: Vec<PeerHandle> = chosen.into_iter().chain(spares).collect();

        let peer = self
            .transfer
            .upload_with_failover(&candidates, metadata, block.data().clone())
            .await?;

        Ok(vec![Placement {
            position: 0,
            checksum: block.checksum(),
            peer,
        }])
    }

    async fn store_copies(
        &self,
        block: &Block,
        metadata: &BlockMetadata,
        peers: Vec<PeerHandle>,
        n: usize,
    ) -> Result<Vec<Placement>> {
        let copies = Replication::new(n)?.introduce_redundancy(vec![block.clone()])?;
        let (chosen, spares) = self.select_peers(peers, n);

        let blocks = copies
            .into_iter()
            .map(|copy| (metadata.clone(), copy.into_data()))
            .collect();
        self.stripe(blocks, &chosen, &spares).await
    }

    async fn store_sharded(
        &self,
        block: &Block,
        metadata: &BlockMetadata,
        peers: Vec<PeerHandle>,
    ) -> Result<(Vec<Placement>, Registration)> {
        let (sharder, codec) = self.pipeline()?;

        let shards = sharder.shard(block)?;
        let stored = codec.introduce_redundancy(shards)?;
        let total = stored.len();
        debug!(
            checksum = %block.checksum(),
            codec = codec.name(),
            blocks = total,
            "Encoded block"
        );

        let layout: Vec<BlockMetadata> = stored
            .iter()
            .enumerate()
            .map(|(position, shard)| shard.metadata().with_recovery(codec.is_recovery(position, total)))
            .collect();

        let (chosen, spares) = self.select_peers(peers, self.scheme.peers());
        let blocks = layout
            .iter()
            .cloned()
            .zip(stored.into_iter().map(Block::into_data))
            .collect();
        let placements = self.stripe(blocks, &chosen, &spares).await?;

        let registration = self.registry.register_shards(metadata.checksum, &layout)?;
        Ok((placements, registration))
    }

    /// Randomly pick up to `count` peers; the rest are spares for failover
    fn select_peers(&self, mut peers: Vec<PeerHandle>, count: usize) -> (Vec<PeerHandle>, Vec<PeerHandle>) {
        if peers.len() < count {
            warn!(
                available = peers.len(),
                requested = count,
                "Fewer peers than requested, doubling up"
            );
        }

        peers.shuffle(&mut *self.rng.lock());
        let spares = peers.split_off(count.min(peers.len()));
        peers.sort_by(|a, b| a.id().cmp(b.id()));
        (peers, spares)
    }

    /// Deal blocks round-robin over `chosen` and upload them.
    ///
    /// Each peer's share is uploaded in order while peers run concurrently.
    /// A failed upload moves to the spares, then to the other chosen peers.
    async fn stripe(
        &self,
        blocks: Vec<(BlockMetadata, Bytes)>,
        chosen: &[PeerHandle],
        spares: &[PeerHandle],
    ) -> Result<Vec<Placement>> {
        let ids: Vec<PeerId> = chosen.iter().map(|p| p.id().clone()).collect();
        let items: Vec<(usize, BlockMetadata, Bytes)> = blocks
            .into_iter()
            .enumerate()
            .map(|(position, (metadata, data))| (position, metadata, data))
            .collect();
        let allocation = RoundRobin.allocate(items, &ids)?;

        let uploads = allocation.into_iter().map(|(peer_id, items)| {
            let candidates: Vec<PeerHandle> = chosen
                .iter()
                .filter(|p| *p.id() == peer_id)
                .chain(spares)
                .chain(chosen.iter().filter(|p| *p.id() != peer_id))
                .cloned()
                .collect();

            async move {
                let mut placements = Vec::with_capacity(items.len());
                for (position, metadata, data) in items {
                    let peer = self
                        .transfer
                        .upload_with_failover(&candidates, &metadata, data)
                        .await?;
                    placements.push(Placement {
                        position,
                        checksum: metadata.checksum,
                        peer,
                    });
                }
                Ok::<_, CairnError>(placements)
            }
        });

        let mut placements = Vec::new();
        for result in join_all(uploads).await {
            placements.extend(result?);
        }
        placements.sort_by_key(|p| p.position);
        Ok(placements)
    }

    // =========================================================================
    // GET
    // =========================================================================

    /// Fetch a file by name or block checksum, verified against its checksum
    pub async fn get(&self, target: &str) -> Result<Block> {
        let root = self.get_handshake(target)?;

        let block = if self.scheme.is_sharded() {
            let metadata = self.registry.catalog_lookup(&root)?;
            let bytes = self.get_sharded(&root, &metadata).await?;
            Block::verified(root, bytes)?
        } else {
            self.get_whole(&root).await?
        };

        info!(
            checksum = %root,
            requested = target,
            scheme = self.scheme.name(),
            size = block.len(),
            "Retrieved file"
        );
        Ok(block)
    }

    async fn get_whole(&self, root: &Checksum) -> Result<Block> {
        let mut hosts = self.registry.hosting_peers(root).await;
        if hosts.is_empty() {
            return Err(CairnError::UnsatisfiableDownload {
                position: 0,
                checksum: root.to_hex(),
            });
        }

        match self.scheme {
            StorageScheme::Hosting if hosts.len() > 1 => {
                warn!(checksum = %root, hosts = hosts.len(), "Hosted block found on several peers");
            }
            StorageScheme::NaiveDuplication { .. } => hosts.shuffle(&mut *self.rng.lock()),
            _ => {}
        }

        self.transfer.download_with_failover(&hosts, root).await
    }

    async fn get_sharded(&self, root: &Checksum, metadata: &BlockMetadata) -> Result<Bytes> {
        let layout = self.registry.lookup_shards(root);
        if layout.is_empty() {
            return Err(CairnError::NotFound(format!("shard layout of block {}", root)));
        }
        let original_len = metadata
            .size
            .ok_or_else(|| CairnError::NotFound(format!("size of block {}", root)))?
            as usize;

        let (_, codec) = self.pipeline()?;
        let total = layout.len();

        let unique: Vec<Checksum> = layout.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let located = self.registry.locate(&unique).await;
        let shard_hosts: Vec<Vec<PeerHandle>> = layout
            .iter()
            .map(|checksum| located.get(checksum).cloned().unwrap_or_default())
            .collect();
        let hosted: Vec<usize> = (0..total).filter(|&p| !shard_hosts[p].is_empty()).collect();
        debug!(root = %root, shards = total, hosted = hosted.len(), "Looked up shards");

        let sample = codec.sample(total, &mut *self.rng.lock());
        let wanted = if sample.iter().all(|&p| !shard_hosts[p].is_empty()) {
            sample
        } else if hosted.len() >= codec.minimum_shards(total) {
            warn!(
                root = %root,
                hosted = hosted.len(),
                "Sampled shard has no live host, fetching every hosted shard"
            );
            hosted.clone()
        } else {
            sample
        };

        let needs: BTreeMap<Need, BTreeSet<PeerId>> = wanted
            .iter()
            .map(|&position| {
                let need = Need {
                    position,
                    checksum: layout[position],
                };
                let peers = shard_hosts[position].iter().map(|p| p.id().clone()).collect();
                (need, peers)
            })
            .collect();
        let itinerary = download_itinerary(&needs)?;

        let rounds = itinerary.into_iter().map(|(peer_id, positions)| {
            let jobs: Vec<(usize, Checksum, Vec<PeerHandle>)> = positions
                .into_iter()
                .map(|p| (p, layout[p], assigned_first(&shard_hosts[p], &peer_id)))
                .collect();
            async move {
                let mut fetched = Vec::with_capacity(jobs.len());
                for (position, checksum, hosts) in jobs {
                    let result = self.transfer.download_with_failover(&hosts, &checksum).await;
                    fetched.push((position, result));
                }
                fetched
            }
        });
        let results: Vec<(usize, Result<Block>)> = join_all(rounds).await.into_iter().flatten().collect();

        let mut shards = ShardSet::new(layout.clone());
        let mut last_failure = None;
        let mut failed = 0;
        for (position, result) in results {
            match result {
                Ok(block) => shards.insert(position, block)?,
                Err(e @ CairnError::Integrity { .. }) => return Err(e),
                Err(e) => {
                    warn!(root = %root, position, error = %e, "Shard download failed");
                    failed += 1;
                    last_failure = Some(e);
                }
            }
        }

        if failed > 0 {
            let spares: Vec<usize> = hosted.iter().copied().filter(|p| !wanted.contains(p)).collect();
            debug!(root = %root, failed, spares = spares.len(), "Fetching spare shards");

            let retries = spares.into_iter().map(|position| {
                let checksum = layout[position];
                let hosts = shard_hosts[position].clone();
                async move {
                    let result = self.transfer.download_with_failover(&hosts, &checksum).await;
                    (position, result)
                }
            });
            for (position, result) in join_all(retries).await {
                match result {
                    Ok(block) => shards.insert(position, block)?,
                    Err(e @ CairnError::Integrity { .. }) => return Err(e),
                    Err(e) => {
                        warn!(root = %root, position, error = %e, "Spare shard download failed");
                        last_failure = Some(e);
                    }
                }
            }
        }

        debug!(
            root = %root,
            present = shards.present(),
            codec = codec.name(),
            "Recovering block"
        );
        match codec.recover(shards, original_len) {
            Ok(bytes) => Ok(bytes),
            Err(e @ CairnError::InsufficientRedundancy { .. }) => Err(last_failure.unwrap_or(e)),
            Err(e) => Err(e),
        }
    }

    fn pipeline(&self) -> Result<Pipeline> {
        self.scheme.pipeline()?.ok_or_else(|| {
            CairnError::InvalidConfig(format!("{} does not shard blocks", self.scheme.name()))
        })
    }
}

/// Hosts of a shard with the itinerary's assigned peer first
fn assigned_first(hosts: &[PeerHandle], assigned: &PeerId) -> Vec<PeerHandle> {
    let mut ordered: Vec<PeerHandle> = hosts.iter().filter(|p| p.id() == assigned).cloned().collect();
    ordered.extend(hosts.iter().filter(|p| p.id() != assigned).cloned());
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_network::{DirectoryConfig, LocalPeer, PeerTransport, StaticDirectory};
    use cairn_storage::memory::MemoryKvStore;

    fn engine(scheme: StorageScheme, count: usize) -> (SchemeEngine, Vec<Arc<LocalPeer>>) {
        let peers: Vec<Arc<LocalPeer>> = (0..count)
            .map(|i| Arc::new(LocalPeer::in_memory(format!("peer-{}", i))))
            .collect();
        let directory = StaticDirectory::with_peers(
            DirectoryConfig::default(),
            peers.iter().map(|p| p.clone() as PeerHandle),
        );
        let registry = Registry::open(Arc::new(MemoryKvStore::new()), Arc::new(directory)).unwrap();
        let engine = SchemeEngine::new(scheme, Arc::new(registry), "self").with_seed(42);
        (engine, peers)
    }

    #[tokio::test]
    async fn test_store_handshake_excludes_self() {
        let peers: Vec<PeerHandle> = ["self", "peer-a"]
            .into_iter()
            .map(|id| Arc::new(LocalPeer::in_memory(id)) as PeerHandle)
            .collect();
        let directory = StaticDirectory::with_peers(DirectoryConfig::default(), peers);
        let registry = Registry::open(Arc::new(MemoryKvStore::new()), Arc::new(directory)).unwrap();
        let engine = SchemeEngine::new(StorageScheme::Hosting, Arc::new(registry), "self");

        let (block, metadata, hosts) = engine
            .store_handshake(&File::named("a.txt", &b"hi"[..]))
            .await
            .unwrap();
        assert_eq!(metadata.name.as_deref(), Some("a.txt"));
        assert_eq!(metadata.checksum, block.checksum());
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].id().as_str(), "peer-a");
    }

    #[tokio::test]
    async fn test_select_peers_splits_spares() {
        let (engine, peers) = engine(StorageScheme::NaiveDuplication { n: 2 }, 5);
        let handles: Vec<PeerHandle> = peers.iter().map(|p| p.clone() as PeerHandle).collect();

        let (chosen, spares) = engine.select_peers(handles, 2);
        assert_eq!(chosen.len(), 2);
        assert_eq!(spares.len(), 3);
        assert!(chosen[0].id() < chosen[1].id());
    }

    #[tokio::test]
    async fn test_stripe_is_round_robin() {
        let (engine, peers) = engine(StorageScheme::VanillaSharding { n: 3, k: 7 }, 3);
        let receipt = engine
            .store(File::named("f", (0u8..70).collect::<Vec<_>>()))
            .await
            .unwrap();

        assert_eq!(receipt.placements.len(), 7);
        for placement in &receipt.placements {
            let expected = receipt.placements[placement.position % 3].peer.clone();
            assert_eq!(placement.peer, expected);
        }
        let counts: Vec<usize> = peers.iter().map(|p| p.blocks().unwrap().len()).collect();
        assert_eq!(counts.iter().sum::<usize>(), 7);
        assert!(counts.iter().max().unwrap() - counts.iter().min().unwrap() <= 1);
    }

    #[tokio::test]
    async fn test_failed_stripe_registers_nothing() {
        let (engine, peers) = engine(StorageScheme::VanillaSharding { n: 2, k: 2 }, 2);

        // Both peers answer the handshake, then go away before the upload
        let file = File::named("f", &b"abcd"[..]);
        let (block, metadata, hosts) = engine.store_handshake(&file).await.unwrap();
        for peer in &peers {
            peer.set_online(false);
        }
        let result = engine.store_sharded(&block, &metadata, hosts).await;

        assert!(matches!(result, Err(CairnError::UnavailablePeer { .. })));
        assert!(engine.registry().lookup_shards(&block.checksum()).is_empty());
        assert!(engine.registry().resolve("f").is_err());
    }

    #[tokio::test]
    async fn test_recovery_blocks_are_flagged() {
        let (engine, _) = engine(StorageScheme::ParitySharding { n: 4, k: 3 }, 4);
        let receipt = engine.store(File::named("f", &b"abcdefghi"[..])).await.unwrap();

        let layout = engine.registry().lookup_shards(&receipt.checksum);
        let flags: Vec<bool> = layout
            .iter()
            .map(|c| engine.registry().catalog_lookup(c).unwrap().is_recovery)
            .collect();
        assert_eq!(flags, vec![false, false, false, true]);
        assert_eq!(receipt.registration, Some(Registration::Created));
    }

    #[tokio::test]
    async fn test_get_handshake_accepts_checksum() {
        let (engine, _) = engine(StorageScheme::Hosting, 2);
        let receipt = engine.store(File::unnamed(&b"anonymous"[..])).await.unwrap();

        let hex = receipt.checksum.to_hex();
        assert_eq!(engine.get_handshake(&hex).unwrap(), receipt.checksum);
        assert!(matches!(
            engine.get_handshake(&Checksum::compute(b"nope").to_hex()),
            Err(CairnError::NotFound(_))
        ));
        assert!(matches!(engine.get_handshake("a.txt"), Err(CairnError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_hosting_get_reads_single_copy() {
        let (engine, peers) = engine(StorageScheme::Hosting, 3);
        let receipt = engine.store(File::named("a.txt", &b"hi"[..])).await.unwrap();

        let holder = peers
            .iter()
            .find(|p| *p.id() == receipt.placements[0].peer)
            .unwrap();
        assert!(holder.contains(&receipt.checksum).await.unwrap());
        assert_eq!(engine.get("a.txt").await.unwrap().data().as_ref(), b"hi");
    }

    #[test]
    fn test_assigned_first() {
        let hosts: Vec<PeerHandle> = ["a", "b", "c"]
            .into_iter()
            .map(|id| Arc::new(LocalPeer::in_memory(id)) as PeerHandle)
            .collect();
        let ordered = assigned_first(&hosts, &PeerId::from("b"));
        let ids: Vec<&str> = ordered.iter().map(|p| p.id().as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
