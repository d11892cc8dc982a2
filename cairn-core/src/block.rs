//! Block types and metadata
//!
//! Blocks are the fundamental unit of storage in Cairn. Each block is
//! content-addressed: its identity is the checksum of its bytes, so a block
//! is immutable once built.

use crate::checksum::Checksum;
use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable content-addressed unit of data
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    checksum: Checksum,
    data: Bytes,
}

impl Block {
    /// Build a block, computing its checksum
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let checksum = Checksum::compute(&data);
        Self { checksum, data }
    }

    /// Rebuild a block received under a declared checksum.
    ///
    /// Fails with an integrity error if the bytes do not hash to `expected`.
    pub fn verified(expected: Checksum, data: impl Into<Bytes>) -> Result<Self> {
        let data: Bytes = data.into();
        expected.verify(&data)?;
        Ok(Self {
            checksum: expected,
            data,
        })
    }

    /// Get the block checksum
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Borrow the block bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Take the block bytes
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Get the block size
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Describe this block as a plain data block
    pub fn metadata(&self) -> BlockMetadata {
        BlockMetadata::for_block(self)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("checksum", &self.checksum)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Descriptor of a block, as recorded in the catalog and sent with uploads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    /// Content-addressed identifier
    pub checksum: Checksum,

    /// User-facing name; unnamed blocks go by their checksum
    pub name: Option<String>,

    /// Size of the block data in bytes
    pub size: Option<u64>,

    /// Produced by a redundancy codec rather than a plain data shard
    pub is_recovery: bool,
}

impl BlockMetadata {
    /// Metadata for an unnamed data block
    pub fn for_block(block: &Block) -> Self {
        Self {
            checksum: block.checksum(),
            name: None,
            size: Some(block.len() as u64),
            is_recovery: false,
        }
    }

    /// Set the user-facing name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark as a recovery block
    pub fn with_recovery(mut self, is_recovery: bool) -> Self {
        self.is_recovery = is_recovery;
        self
    }

    /// The name this block goes by
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.checksum.to_hex())
    }

    /// Whether the block was named by a user
    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }
}
