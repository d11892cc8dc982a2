//! Cairn Node Library
//!
//! Provides the pieces a storage node runs:
//! - Configuration management
//! - Storage schemes (hosting, duplication, sharding, parity, Reed-Solomon)
//!   and the engine that stores and retrieves files through them
//! - A local simulated cluster of in-process peers

pub mod cluster;
pub mod config;
pub mod scheme;

pub use cluster::LocalCluster;
pub use config::{
    ConfigError, NetworkSettings, NodeConfig, NodeIdentity, PeerEntry, SchemeConfig, SchemeKind,
};
pub use scheme::{File, Placement, SchemeEngine, StorageScheme, StoreReceipt, Transfer};
