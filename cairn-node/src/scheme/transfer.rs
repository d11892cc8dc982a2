//! Block transfer with timeouts and failover
//!
//! A stalled call counts as an unavailable peer, and unavailable peers are
//! dropped from the directory. Failover moves on to the next candidate only
//! for errors another peer could fix; integrity failures stop the transfer.

use bytes::Bytes;
use cairn_core::block::{Block, BlockMetadata};
use cairn_core::checksum::Checksum;
use cairn_core::error::{CairnError, Result};
use cairn_network::{PeerDirectory, PeerHandle, PeerId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Timed uploads and downloads against peer handles
#[derive(Clone)]
pub struct Transfer {
    timeout: Duration,
    directory: Option<Arc<dyn PeerDirectory>>,
}

impl Default for Transfer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Transfer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            directory: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Report peers found unavailable to `directory`
    pub fn with_directory(mut self, directory: Arc<dyn PeerDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    fn note_failure(&self, peer: &PeerHandle, error: &CairnError) {
        if let (CairnError::UnavailablePeer { .. }, Some(directory)) = (error, &self.directory) {
            directory.report_unavailable(peer.id());
        }
    }

    fn timed_out(&self, peer: &PeerHandle, call: &str) -> CairnError {
        CairnError::UnavailablePeer {
            peer: peer.id().to_string(),
            reason: format!("{} timed out after {:?}", call, self.timeout),
        }
    }

    /// Upload one block to one peer
    pub async fn upload(&self, peer: &PeerHandle, metadata: &BlockMetadata, data: Bytes) -> Result<()> {
        tokio::time::timeout(self.timeout, peer.store(metadata, data))
            .await
            .map_err(|_| self.timed_out(peer, "store"))?
    }

    /// Download one block from one peer and check it against `checksum`
    pub async fn download(&self, peer: &PeerHandle, checksum: &Checksum) -> Result<Block> {
        let data = tokio::time::timeout(self.timeout, peer.retrieve(checksum))
            .await
            .map_err(|_| self.timed_out(peer, "retrieve"))??;
        Block::verified(*checksum, data)
    }

    /// Upload to the first candidate that accepts the block.
    ///
    /// Returns the id of the peer now holding it.
    pub async fn upload_with_failover(
        &self,
        candidates: &[PeerHandle],
        metadata: &BlockMetadata,
        data: Bytes,
    ) -> Result<PeerId> {
        let mut last_error = None;

        for peer in candidates {
            match self.upload(peer, metadata, data.clone()).await {
                Ok(()) => {
                    debug!(peer = %peer.id(), checksum = %metadata.checksum, "Uploaded block");
                    return Ok(peer.id().clone());
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        peer = %peer.id(),
                        checksum = %metadata.checksum,
                        error = %e,
                        "Upload failed, trying next peer"
                    );
                    self.note_failure(peer, &e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CairnError::NotAvailable(format!("no peer left to host block {}", metadata.name()))
        }))
    }

    /// Download from the first host that returns the block
    pub async fn download_with_failover(&self, hosts: &[PeerHandle], checksum: &Checksum) -> Result<Block> {
        let mut last_error = None;

        for peer in hosts {
            match self.download(peer, checksum).await {
                Ok(block) => {
                    debug!(peer = %peer.id(), checksum = %checksum, "Downloaded block");
                    return Ok(block);
                }
                Err(e) if e.is_retryable() || matches!(e, CairnError::NotFound(_)) => {
                    warn!(
                        peer = %peer.id(),
                        checksum = %checksum,
                        error = %e,
                        "Download failed, trying next host"
                    );
                    self.note_failure(peer, &e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CairnError::NotAvailable(format!("no live peer hosts block {}", checksum))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_network::{DirectoryConfig, LocalPeer, PeerTransport, StaticDirectory};

    fn peers(count: usize) -> Vec<Arc<LocalPeer>> {
        (0..count)
            .map(|i| Arc::new(LocalPeer::in_memory(format!("peer-{}", i))))
            .collect()
    }

    fn handles(peers: &[Arc<LocalPeer>]) -> Vec<PeerHandle> {
        peers.iter().map(|p| p.clone() as PeerHandle).collect()
    }

    #[tokio::test]
    async fn test_upload_fails_over_offline_peer() {
        let peers = peers(2);
        peers[0].set_online(false);
        let block = Block::new(&b"payload"[..]);

        let holder = Transfer::default()
            .upload_with_failover(&handles(&peers), &block.metadata(), block.data().clone())
            .await
            .unwrap();

        assert_eq!(holder.as_str(), "peer-1");
        assert!(peers[1].contains(&block.checksum()).await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_integrity_failure_is_not_retried() {
        let peers = peers(2);
        let metadata = Block::new(&b"payload"[..]).metadata();

        let result = Transfer::default()
            .upload_with_failover(&handles(&peers), &metadata, Bytes::from_static(b"other"))
            .await;

        assert!(matches!(result, Err(CairnError::Integrity { .. })));
        assert!(peers[1].blocks().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_download_fails_over() {
        let peers = peers(2);
        let block = Block::new(&b"payload"[..]);
        for peer in &peers {
            peer.store(&block.metadata(), block.data().clone()).await.unwrap();
        }
        peers[0].set_latency(Duration::from_secs(60));

        let transfer = Transfer::new(Duration::from_millis(200));
        let fetched = transfer
            .download_with_failover(&handles(&peers), &block.checksum())
            .await
            .unwrap();
        assert_eq!(fetched, block);

        let stalled = transfer.download(&handles(&peers)[0], &block.checksum()).await;
        assert!(matches!(stalled, Err(CairnError::UnavailablePeer { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_host_is_dropped_from_directory() {
        let peers = peers(2);
        let block = Block::new(&b"payload"[..]);
        for peer in &peers {
            peer.store(&block.metadata(), block.data().clone()).await.unwrap();
        }
        let directory = Arc::new(StaticDirectory::with_peers(
            DirectoryConfig {
                ping_timeout: Duration::from_secs(2),
            },
            handles(&peers),
        ));

        // Slow enough to miss the call timeout, fast enough to answer pings
        peers[0].set_latency(Duration::from_secs(1));
        let transfer = Transfer::new(Duration::from_millis(200)).with_directory(directory.clone());
        let fetched = transfer
            .download_with_failover(&handles(&peers), &block.checksum())
            .await
            .unwrap();

        assert_eq!(fetched, block);
        assert_eq!(directory.known(), vec![PeerId::from("peer-1")]);
    }

    #[tokio::test]
    async fn test_missing_block_keeps_host_in_directory() {
        let peers = peers(2);
        let block = Block::new(&b"payload"[..]);
        peers[1].store(&block.metadata(), block.data().clone()).await.unwrap();
        let directory = Arc::new(StaticDirectory::with_peers(DirectoryConfig::default(), handles(&peers)));

        Transfer::default()
            .with_directory(directory.clone())
            .download_with_failover(&handles(&peers), &block.checksum())
            .await
            .unwrap();
        assert_eq!(directory.len(), 2);
    }

    #[tokio::test]
    async fn test_download_skips_host_without_block() {
        let peers = peers(2);
        let block = Block::new(&b"payload"[..]);
        peers[1].store(&block.metadata(), block.data().clone()).await.unwrap();

        let fetched = Transfer::default()
            .download_with_failover(&handles(&peers), &block.checksum())
            .await
            .unwrap();
        assert_eq!(fetched.data(), block.data());
    }

    #[tokio::test]
    async fn test_corrupt_download_is_fatal() {
        let peers = peers(2);
        let block = Block::new(&b"payload"[..]);
        for peer in &peers {
            peer.store(&block.metadata(), block.data().clone()).await.unwrap();
        }
        peers[0]
            .corrupt(&block.checksum(), Bytes::from_static(b"garbage"))
            .unwrap();

        let result = Transfer::default()
            .download_with_failover(&handles(&peers), &block.checksum())
            .await;
        assert!(matches!(result, Err(CairnError::Integrity { .. })));
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let block = Block::new(&b"payload"[..]);
        let result = Transfer::default()
            .download_with_failover(&[], &block.checksum())
            .await;
        assert!(matches!(result, Err(CairnError::NotAvailable(_))));
    }
}
