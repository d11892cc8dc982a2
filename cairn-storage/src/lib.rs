//! Cairn Storage Backend
//!
//! Provides storage abstractions and implementations:
//! - `BlockStore` trait for a peer's local block storage
//! - `KvStore` trait for the registry's durable metadata
//! - `MemoryBackend` / `MemoryKvStore` for tests and simulated clusters
//! - `SledStore` for persistent blocks and metadata

pub mod backend;
pub mod kv;
pub mod memory;
pub mod sled_backend;

pub use backend::{BlockStore, StorageStats};
pub use kv::KvStore;
pub use memory::{MemoryBackend, MemoryKvStore};
pub use sled_backend::SledStore;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to storage directory
    pub path: std::path::PathBuf,

    /// Maximum storage capacity in bytes (0 = unlimited)
    pub max_capacity: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: std::path::PathBuf::from("./cairn_data"),
            max_capacity: 0, // Unlimited
        }
    }
}

impl StorageConfig {
    /// Create a new storage config with the given path
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set maximum capacity
    pub fn with_max_capacity(mut self, bytes: u64) -> Self {
        self.max_capacity = bytes;
        self
    }
}
