//! In-process peer
//!
//! A `LocalPeer` serves a block store directly, without a wire. It can be
//! taken offline or slowed down to simulate peer failures and stalls.

use crate::peer::{PeerId, PeerTransport};
use bytes::Bytes;
use cairn_core::block::BlockMetadata;
use cairn_core::checksum::Checksum;
use cairn_core::error::{CairnError, Result};
use cairn_storage::backend::{BlockStore, StorageStats};
use cairn_storage::memory::MemoryBackend;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Peer backed by a local block store
pub struct LocalPeer {
    id: PeerId,
    address: String,
    store: Arc<dyn BlockStore>,
    /// Block names as announced on upload
    names: RwLock<HashMap<String, Checksum>>,
    online: AtomicBool,
    latency_ms: AtomicU64,
}

impl LocalPeer {
    /// Create a peer over the given store
    pub fn new(id: impl Into<PeerId>, address: impl Into<String>, store: Arc<dyn BlockStore>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            store,
            names: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Create a peer over a fresh in-memory store
    pub fn in_memory(id: impl Into<PeerId>) -> Self {
        let id = id.into();
        let address = format!("local://{}", id);
        Self::new(id, address, Arc::new(MemoryBackend::new()))
    }

    /// Bring the peer up or down
    pub fn set_online(&self, online: bool) {
        debug!(peer = %self.id, online, "Peer liveness changed");
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Statistics of the underlying store
    pub fn stats(&self) -> Result<StorageStats> {
        self.store.stats()
    }

    /// Checksums of every block held
    pub fn blocks(&self) -> Result<Vec<Checksum>> {
        self.store.list()
    }

    /// Drop a block without going through the transport
    pub fn lose(&self, checksum: &Checksum) -> Result<bool> {
        self.store.delete(checksum)
    }

    /// Overwrite a held block with arbitrary bytes
    pub fn corrupt(&self, checksum: &Checksum, data: Bytes) -> Result<()> {
        self.store.put(*checksum, data)
    }

    async fn reachable(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.is_online() {
            return Err(CairnError::UnavailablePeer {
                peer: self.id.to_string(),
                reason: "peer is offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PeerTransport for LocalPeer {
    fn id(&self) -> &PeerId {
        &self.id
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn store(&self, metadata: &BlockMetadata, data: Bytes) -> Result<()> {
        self.reachable().await?;
        metadata.checksum.verify(&data)?;

        self.store.put(metadata.checksum, data)?;
        self.names.write().insert(metadata.name(), metadata.checksum);

        debug!(
            peer = %self.id,
            checksum = %metadata.checksum,
            name = %metadata.name(),
            "Stored block"
        );
        Ok(())
    }

    async fn retrieve(&self, checksum: &Checksum) -> Result<Bytes> {
        self.reachable().await?;
        self.store.get(checksum)?.ok_or_else(|| {
            CairnError::NotFound(format!("block {} on peer {}", checksum, self.id))
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.reachable().await?;
        let checksum = match self.names.write().remove(name) {
            Some(checksum) => checksum,
            None => Checksum::from_hex(name).map_err(|_| {
                CairnError::NotFound(format!("block {} on peer {}", name, self.id))
            })?,
        };
        if !self.store.delete(&checksum)? {
            return Err(CairnError::NotFound(format!(
                "block {} on peer {}",
                name, self.id
            )));
        }
        debug!(peer = %self.id, name, "Deleted block");
        Ok(())
    }

    async fn contains(&self, checksum: &Checksum) -> Result<bool> {
        self.reachable().await?;
        self.store.exists(checksum)
    }

    async fn ping(&self) -> bool {
        self.reachable().await.is_ok()
    }
}
