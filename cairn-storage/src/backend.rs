//! Block store trait
//!
//! Defines the interface a peer's local block storage must follow. Blocks
//! are keyed by their checksum; stores never interpret the bytes.

use bytes::Bytes;
use cairn_core::checksum::Checksum;
use cairn_core::error::Result;

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of blocks stored
    pub block_count: u64,

    /// Total bytes used by blocks
    pub bytes_used: u64,

    /// Total storage capacity (0 = unlimited)
    pub bytes_capacity: u64,

    /// Number of read operations
    pub reads: u64,

    /// Number of write operations
    pub writes: u64,

    /// Number of delete operations
    pub deletes: u64,
}

/// Synchronous block storage
///
/// All implementations must be Send + Sync so a peer can share one store
/// across concurrent transfers.
pub trait BlockStore: Send + Sync {
    /// Store a block under its checksum, replacing any previous copy
    fn put(&self, checksum: Checksum, data: Bytes) -> Result<()>;

    /// Retrieve a block
    fn get(&self, checksum: &Checksum) -> Result<Option<Bytes>>;

    /// Delete a block, returning whether it existed
    fn delete(&self, checksum: &Checksum) -> Result<bool>;

    /// Check if a block exists
    fn exists(&self, checksum: &Checksum) -> Result<bool>;

    /// Get storage statistics
    fn stats(&self) -> Result<StorageStats>;

    /// List all stored checksums
    fn list(&self) -> Result<Vec<Checksum>>;

    /// Flush any pending writes
    fn flush(&self) -> Result<()>;
}
