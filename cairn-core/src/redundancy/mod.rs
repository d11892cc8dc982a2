//! Redundancy and recovery codecs
//!
//! A codec turns the data shards of a block into the stored layout (data
//! shards followed by any recovery blocks) and turns enough of that layout
//! back into the original bytes. Storage schemes only ever see this
//! contract: shards in, fused bytes out.

mod parity;
mod reed_solomon;
mod replication;

pub use parity::XorParity;
pub use reed_solomon::{ReedSolomonCodec, RS_BLOCK_SIZE};
pub use replication::{NoRedundancy, Replication};

use crate::block::Block;
use crate::error::Result;
use crate::shard::ShardSet;
use bytes::Bytes;
use rand::RngCore;

/// Recovery strategy shared by every storage scheme
pub trait Redundancy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Add recovery blocks to the data shards, returning the stored layout
    fn introduce_redundancy(&self, shards: Vec<Block>) -> Result<Vec<Block>>;

    /// Whether the stored block at `position` of `total` is a recovery block
    fn is_recovery(&self, position: usize, total: usize) -> bool;

    /// Fewest stored shards a retrieval must fetch
    fn minimum_shards(&self, total: usize) -> usize;

    /// Pick the layout positions to download, ascending
    fn sample(&self, total: usize, rng: &mut dyn RngCore) -> Vec<usize>;

    /// Rebuild the original bytes from whatever shards are present
    fn recover(&self, shards: ShardSet, original_len: usize) -> Result<Bytes>;
}

/// Choose `amount` distinct positions out of `total`, ascending
pub(crate) fn sample_positions(total: usize, amount: usize, rng: &mut dyn RngCore) -> Vec<usize> {
    let mut picked = rand::seq::index::sample(rng, total, amount.min(total)).into_vec();
    picked.sort_unstable();
    picked
}
