//! Sled-based persistent storage
//!
//! One sled database per node. Blocks live in the `blocks` tree keyed by
//! raw checksum bytes; registry values live in the `metadata` tree keyed by
//! name. Sled is pure Rust and flushes on demand.

use crate::backend::{BlockStore, StorageStats};
use crate::kv::KvStore;
use crate::StorageConfig;
use bytes::Bytes;
use cairn_core::checksum::Checksum;
use cairn_core::error::{CairnError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

const BLOCKS_TREE: &str = "blocks";
const METADATA_TREE: &str = "metadata";

fn storage_err(e: sled::Error) -> CairnError {
    CairnError::Storage(e.to_string())
}

/// Sled-backed block and metadata store
pub struct SledStore {
    db: sled::Db,
    blocks: sled::Tree,
    metadata: sled::Tree,
    max_capacity: u64,
    bytes_used: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl SledStore {
    /// Open or create a store
    pub fn open(config: &StorageConfig) -> Result<Self> {
        info!(path = ?config.path, "Opening Sled store");

        let db = sled::open(&config.path)
            .map_err(|e| CairnError::Storage(format!("Failed to open Sled: {}", e)))?;
        Self::from_db(db, config.max_capacity)
    }

    /// Open an in-memory store (for testing)
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| CairnError::Storage(format!("Failed to open Sled: {}", e)))?;
        Self::from_db(db, 0)
    }

    fn from_db(db: sled::Db, max_capacity: u64) -> Result<Self> {
        let blocks = db.open_tree(BLOCKS_TREE).map_err(storage_err)?;
        let metadata = db.open_tree(METADATA_TREE).map_err(storage_err)?;

        let mut bytes_used = 0u64;
        for item in blocks.iter() {
            let (_, value) = item.map_err(storage_err)?;
            bytes_used += value.len() as u64;
        }
        debug!(blocks = blocks.len(), bytes_used, "Loaded Sled store");

        Ok(Self {
            db,
            blocks,
            metadata,
            max_capacity,
            bytes_used: AtomicU64::new(bytes_used),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }
}

impl BlockStore for SledStore {
    fn put(&self, checksum: Checksum, data: Bytes) -> Result<()> {
        let data_len = data.len() as u64;
        let key = checksum.as_bytes();
        let replaced = self
            .blocks
            .get(key)
            .map_err(storage_err)?
            .map_or(0, |old| old.len() as u64);

        if self.max_capacity > 0 {
            let current = self.bytes_used.load(Ordering::SeqCst) - replaced;
            if current + data_len > self.max_capacity {
                return Err(CairnError::Storage(format!(
                    "storage full: {} of {} bytes used",
                    current, self.max_capacity
                )));
            }
        }

        self.blocks
            .insert(key, data.as_ref())
            .map_err(storage_err)?;
        self.bytes_used.fetch_sub(replaced, Ordering::SeqCst);
        self.bytes_used.fetch_add(data_len, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);

        debug!(checksum = %checksum, size = data_len, "Stored block");
        Ok(())
    }

    fn get(&self, checksum: &Checksum) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .blocks
            .get(checksum.as_bytes())
            .map_err(storage_err)?
            .map(|v| Bytes::copy_from_slice(&v)))
    }

    fn delete(&self, checksum: &Checksum) -> Result<bool> {
        match self.blocks.remove(checksum.as_bytes()).map_err(storage_err)? {
            Some(old) => {
                self.bytes_used
                    .fetch_sub(old.len() as u64, Ordering::SeqCst);
                self.deletes.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn exists(&self, checksum: &Checksum) -> Result<bool> {
        self.blocks
            .contains_key(checksum.as_bytes())
            .map_err(storage_err)
    }

    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            block_count: self.blocks.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn list(&self) -> Result<Vec<Checksum>> {
        let mut listed = Vec::new();
        for key in self.blocks.iter().keys() {
            let key = key.map_err(storage_err)?;
            let bytes: [u8; 32] = key.as_ref().try_into().map_err(|_| {
                CairnError::Storage(format!("malformed block key of {} bytes", key.len()))
            })?;
            listed.push(Checksum::from_bytes(bytes));
        }
        Ok(listed)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self
            .metadata
            .get(key.as_bytes())
            .map_err(storage_err)?
            .map(|v| Bytes::copy_from_slice(&v)))
    }

    fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.metadata
            .insert(key.as_bytes(), value.as_ref())
            .map_err(storage_err)?;
        self.metadata.flush().map_err(storage_err)?;
        Ok(())
    }
}
