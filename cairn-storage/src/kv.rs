//! Durable key-value surface
//!
//! The registry persists each of its maps as one serialized value under a
//! fixed key. Stores only need whole-value get and put.

use bytes::Bytes;
use cairn_core::error::Result;
use serde::{de::DeserializeOwned, Serialize};

/// Key-value store backing persisted metadata
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Replace the value stored under `key`, durably before returning
    fn put(&self, key: &str, value: Bytes) -> Result<()>;
}

/// Store a bincode-encoded value
pub fn put_value<V: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &V) -> Result<()> {
    let encoded = bincode::serialize(value)?;
    store.put(key, Bytes::from(encoded))
}

/// Load a bincode-encoded value
pub fn get_value<V: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<V>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}
