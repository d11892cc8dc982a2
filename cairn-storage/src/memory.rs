//! In-memory storage backends
//!
//! Used for testing and simulated clusters. Not persistent.

use crate::backend::{BlockStore, StorageStats};
use crate::kv::KvStore;
use bytes::Bytes;
use cairn_core::checksum::Checksum;
use cairn_core::error::{CairnError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory block store
pub struct MemoryBackend {
    /// Block storage
    blocks: RwLock<HashMap<Checksum, Bytes>>,

    /// Maximum capacity (0 = unlimited)
    max_capacity: u64,

    /// Current bytes used
    bytes_used: AtomicU64,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with a maximum capacity
    pub fn with_capacity(max_bytes: u64) -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            max_capacity: max_bytes,
            bytes_used: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryBackend {
    fn put(&self, checksum: Checksum, data: Bytes) -> Result<()> {
        let data_len = data.len() as u64;
        let mut blocks = self.blocks.write();
        let replaced = blocks.get(&checksum).map_or(0, |old| old.len() as u64);

        if self.max_capacity > 0 {
            let current = self.bytes_used.load(Ordering::SeqCst) - replaced;
            if current + data_len > self.max_capacity {
                return Err(CairnError::Storage(format!(
                    "storage full: {} of {} bytes used",
                    current, self.max_capacity
                )));
            }
        }

        blocks.insert(checksum, data);
        self.bytes_used.fetch_sub(replaced, Ordering::SeqCst);
        self.bytes_used.fetch_add(data_len, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    fn get(&self, checksum: &Checksum) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let blocks = self.blocks.read();
        Ok(blocks.get(checksum).cloned())
    }

    fn delete(&self, checksum: &Checksum) -> Result<bool> {
        let mut blocks = self.blocks.write();

        if let Some(old) = blocks.remove(checksum) {
            self.bytes_used
                .fetch_sub(old.len() as u64, Ordering::SeqCst);
            self.deletes.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn exists(&self, checksum: &Checksum) -> Result<bool> {
        let blocks = self.blocks.read();
        Ok(blocks.contains_key(checksum))
    }

    fn stats(&self) -> Result<StorageStats> {
        let blocks = self.blocks.read();
        Ok(StorageStats {
            block_count: blocks.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn list(&self) -> Result<Vec<Checksum>> {
        let blocks = self.blocks.read();
        let mut listed: Vec<Checksum> = blocks.keys().copied().collect();
        listed.sort_unstable();
        Ok(listed)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory key-value store
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}
