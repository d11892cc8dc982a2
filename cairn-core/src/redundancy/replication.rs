//! Plain sharding and whole-copy replication.

use super::Redundancy;
use crate::block::Block;
use crate::error::{CairnError, Result};
use crate::shard::{fuse, ShardSet};
use bytes::Bytes;
use rand::{Rng, RngCore};

/// No recovery blocks: every data shard must be fetched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRedundancy;

impl Redundancy for NoRedundancy {
    fn name(&self) -> &'static str {
        "none"
    }

    fn introduce_redundancy(&self, shards: Vec<Block>) -> Result<Vec<Block>> {
        Ok(shards)
    }

    fn is_recovery(&self, _position: usize, _total: usize) -> bool {
        false
    }

    fn minimum_shards(&self, total: usize) -> usize {
        total
    }

    fn sample(&self, total: usize, _rng: &mut dyn RngCore) -> Vec<usize> {
        (0..total).collect()
    }

    fn recover(&self, shards: ShardSet, original_len: usize) -> Result<Bytes> {
        let total = shards.len();
        let present = shards.present();
        let blocks = shards
            .into_slots()
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(CairnError::InsufficientRedundancy {
                available: present,
                required: total,
            })?;
        Ok(fuse(&blocks, original_len)?.into_data())
    }
}

/// Every data shard stored `copies` times.
///
/// The stored layout repeats each shard consecutively:
/// `[s0, s0, s1, s1, ...]` for two copies. Any one copy of each shard is
/// enough to rebuild the block.
#[derive(Debug, Clone, Copy)]
pub struct Replication {
    pub copies: usize,
}

impl Replication {
    pub fn new(copies: usize) -> Result<Self> {
        if copies == 0 {
            return Err(CairnError::InvalidConfig(
                "replication factor must be > 0".to_string(),
            ));
        }
        Ok(Self { copies })
    }

    /// Number of distinct shards in a stored layout
    fn groups(&self, total: usize) -> usize {
        total / self.copies
    }
}

impl Redundancy for Replication {
    fn name(&self) -> &'static str {
        "replication"
    }

    fn introduce_redundancy(&self, shards: Vec<Block>) -> Result<Vec<Block>> {
        Ok(shards
            .into_iter()
            .flat_map(|s| std::iter::repeat(s).take(self.copies))
            .collect())
    }

    fn is_recovery(&self, _position: usize, _total: usize) -> bool {
        false
    }

    fn minimum_shards(&self, total: usize) -> usize {
        self.groups(total)
    }

    fn sample(&self, total: usize, rng: &mut dyn RngCore) -> Vec<usize> {
        (0..self.groups(total))
            .map(|g| g * self.copies + rng.gen_range(0..self.copies))
            .collect()
    }

    fn recover(&self, shards: ShardSet, original_len: usize) -> Result<Bytes> {
        if shards.len() % self.copies != 0 {
            return Err(CairnError::InvalidConfig(format!(
                "layout of {} is not a multiple of {} copies",
                shards.len(),
                self.copies
            )));
        }
        let groups = self.groups(shards.len());
        let present = shards.present();
        let slots = shards.into_slots();

        let originals = slots
            .chunks(self.copies)
            .map(|copies| copies.iter().flatten().next().cloned())
            .collect::<Option<Vec<_>>>()
            .ok_or(CairnError::InsufficientRedundancy {
                available: present,
                required: groups,
            })?;

        Ok(fuse(&originals, original_len)?.into_data())
    }
}
