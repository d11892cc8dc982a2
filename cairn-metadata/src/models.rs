//! Registry models
//!
//! Each map is persisted whole, bincode-encoded, under its own key.

use cairn_core::block::BlockMetadata;
use cairn_core::checksum::Checksum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store key of the filename index
pub const INDEX_KEY: &str = "index";
/// Store key of the block catalog
pub const CATALOG_KEY: &str = "catalog";
/// Store key of the blocktree
pub const BLOCKTREE_KEY: &str = "blocktree";

/// Filename -> root block checksum, for user-named files only
pub type Index = BTreeMap<String, Checksum>;

/// Block checksum -> metadata
pub type Catalog = BTreeMap<Checksum, BlockMetadata>;

/// Block checksum -> ordered shard checksums
pub type Blocktree = BTreeMap<Checksum, Vec<Checksum>>;

/// The three registry maps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    pub index: Index,
    pub catalog: Catalog,
    pub blocktree: Blocktree,
}

/// Outcome of recording a block's shard layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// No layout was recorded before
    Created,
    /// The same layout was already recorded
    Unchanged,
    /// A different layout was recorded and has been overwritten
    Replaced,
}

impl std::fmt::Display for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Replaced => write!(f, "replaced"),
        }
    }
}
