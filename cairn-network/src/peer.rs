//! Peer identity and transport
//!
//! The transport is the only way schemes move bytes. Every call names the
//! block it carries by checksum; no call relies on ordering across peers.

use bytes::Bytes;
use cairn_core::block::BlockMetadata;
use cairn_core::checksum::Checksum;
use cairn_core::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stable identifier of a storage peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Block transfer to and from one storage peer
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// Peer identifier
    fn id(&self) -> &PeerId;

    /// Address the peer is reachable at
    fn address(&self) -> &str;

    /// Upload a block; the peer verifies the bytes against `metadata.checksum`
    async fn store(&self, metadata: &BlockMetadata, data: Bytes) -> Result<()>;

    /// Download a block, `NotFound` if the peer does not hold it
    async fn retrieve(&self, checksum: &Checksum) -> Result<Bytes>;

    /// Delete a block by name or hex checksum, `NotFound` if unknown
    async fn delete(&self, name: &str) -> Result<()>;

    /// Whether the peer holds a block
    async fn contains(&self, checksum: &Checksum) -> Result<bool>;

    /// Liveness check
    async fn ping(&self) -> bool;
}

/// Shared handle to a peer transport
pub type PeerHandle = Arc<dyn PeerTransport>;
