//! Sharding and fusion
//!
//! A block is split into `k` contiguous ranges of equal width
//! `ceil(len / k)`; short trailing ranges are null-padded so XOR and
//! Reed-Solomon arithmetic always see uniform shards. The recorded shard
//! order, not arrival order, drives reassembly.

use crate::block::Block;
use crate::checksum::Checksum;
use crate::error::{CairnError, Result};
use crate::primitives::{concat, pad, unpad};

/// Split a block into `k` equal-width, null-padded shards
pub fn shard(block: &Block, k: usize) -> Result<Vec<Block>> {
    if k == 0 {
        return Err(CairnError::InvalidConfig(
            "number of shards must be > 0".to_string(),
        ));
    }

    let data = block.data();
    let width = data.len().div_ceil(k);

    let shards = (0..k)
        .map(|i| {
            let start = (i * width).min(data.len());
            let end = ((i + 1) * width).min(data.len());
            Block::new(pad(&data[start..end], width))
        })
        .collect();

    Ok(shards)
}

/// Concatenate shards in order and strip padding back to `original_len`
pub fn fuse(shards: &[Block], original_len: usize) -> Result<Block> {
    let payloads: Vec<&[u8]> = shards.iter().map(|s| s.data().as_ref()).collect();
    let data = unpad(concat(&payloads), original_len)?;
    Ok(Block::new(data))
}

/// Splits a block into the data shards a scheme stores
pub trait Sharder: Send + Sync {
    fn shard(&self, block: &Block) -> Result<Vec<Block>>;
}

/// Fixed shard count
#[derive(Debug, Clone, Copy)]
pub struct FixedSharder {
    pub shards: usize,
}

impl FixedSharder {
    pub fn new(shards: usize) -> Self {
        Self { shards }
    }
}

impl Sharder for FixedSharder {
    fn shard(&self, block: &Block) -> Result<Vec<Block>> {
        shard(block, self.shards)
    }
}

/// Passes the block through whole, for codecs that carve their own shards
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsharded;

impl Sharder for Unsharded {
    fn shard(&self, block: &Block) -> Result<Vec<Block>> {
        Ok(vec![block.clone()])
    }
}

/// Shards of one block, addressed by position in the recorded layout.
///
/// Positions rather than checksums identify shards, so two shards with
/// identical bytes stay distinct.
#[derive(Debug, Clone)]
pub struct ShardSet {
    layout: Vec<Checksum>,
    slots: Vec<Option<Block>>,
}

impl ShardSet {
    /// Empty set over an ordered layout
    pub fn new(layout: Vec<Checksum>) -> Self {
        let slots = vec![None; layout.len()];
        Self { layout, slots }
    }

    /// Fully populated set, layout taken from the blocks themselves
    pub fn complete(blocks: Vec<Block>) -> Self {
        let layout = blocks.iter().map(Block::checksum).collect();
        let slots = blocks.into_iter().map(Some).collect();
        Self { layout, slots }
    }

    /// Place a shard at its position, checking it against the layout
    pub fn insert(&mut self, position: usize, block: Block) -> Result<()> {
        let expected = *self.layout.get(position).ok_or_else(|| {
            CairnError::NotFound(format!(
                "shard position {} outside layout of {}",
                position,
                self.layout.len()
            ))
        })?;
        if block.checksum() != expected {
            return Err(CairnError::Integrity {
                expected: expected.to_hex(),
                actual: block.checksum().to_hex(),
            });
        }
        self.slots[position] = Some(block);
        Ok(())
    }

    /// Drop the shard at a position
    pub fn remove(&mut self, position: usize) -> Option<Block> {
        self.slots.get_mut(position).and_then(Option::take)
    }

    pub fn layout(&self) -> &[Checksum] {
        &self.layout
    }

    pub fn get(&self, position: usize) -> Option<&Block> {
        self.slots.get(position).and_then(Option::as_ref)
    }

    /// Number of positions in the layout
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Number of positions holding a shard
    pub fn present(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Positions with no shard, ascending
    pub fn missing(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Take the slots, in layout order
    pub fn into_slots(self) -> Vec<Option<Block>> {
        self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nine_bytes_three_shards() {
        let block = Block::new(&b"abcdefghi"[..]);
        let shards = shard(&block, 3).unwrap();
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0].data().as_ref(), b"abc");
        assert_eq!(shards[1].data().as_ref(), b"def");
        assert_eq!(shards[2].data().as_ref(), b"ghi");

        let fused = fuse(&shards, block.len()).unwrap();
        assert_eq!(fused.checksum(), block.checksum());
    }

    #[test]
    fn test_last_shard_is_padded() {
        let block = Block::new(&b"abcdefghij"[..]);
        let shards = shard(&block, 4).unwrap();
        assert!(shards.iter().all(|s| s.len() == 3));
        assert_eq!(shards[3].data().as_ref(), b"j\0\0");
    }

    #[test]
    fn test_more_shards_than_bytes() {
        let block = Block::new(&b"ab"[..]);
        let shards = shard(&block, 4).unwrap();
        assert_eq!(shards.len(), 4);
        assert_eq!(shards[2].data().as_ref(), b"\0");
        assert_eq!(fuse(&shards, 2).unwrap(), block);
    }

    #[test]
    fn test_trailing_nulls_survive() {
        let block = Block::new(vec![1u8, 0, 0, 0, 0]);
        let shards = shard(&block, 2).unwrap();
        assert_eq!(fuse(&shards, block.len()).unwrap(), block);
    }

    #[test]
    fn test_zero_shards_rejected() {
        let block = Block::new(&b"x"[..]);
        assert!(matches!(shard(&block, 0), Err(CairnError::InvalidConfig(_))));
    }

    #[test]
    fn test_shard_set_checks_layout() {
        let shards = shard(&Block::new(&b"abcdef"[..]), 2).unwrap();
        let layout = shards.iter().map(Block::checksum).collect();
        let mut set = ShardSet::new(layout);

        set.insert(1, shards[1].clone()).unwrap();
        assert_eq!(set.present(), 1);
        assert_eq!(set.missing(), vec![0]);

        let wrong = set.insert(0, shards[1].clone());
        assert!(matches!(wrong, Err(CairnError::Integrity { .. })));
        assert!(set.insert(5, shards[0].clone()).is_err());
    }

    #[test]
    fn test_identical_shards_keep_positions() {
        let block = Block::new(vec![0u8; 8]);
        let shards = shard(&block, 4).unwrap();
        let mut set = ShardSet::new(shards.iter().map(Block::checksum).collect());
        set.insert(3, shards[3].clone()).unwrap();
        assert_eq!(set.missing(), vec![0, 1, 2]);
    }

    proptest! {
        #[test]
        fn prop_fuse_inverts_shard(data in proptest::collection::vec(any::<u8>(), 0..512), k in 1usize..16) {
            let block = Block::new(data.clone());
            let shards = shard(&block, k).unwrap();
            prop_assert_eq!(shards.len(), k);
            let width = shards[0].len();
            prop_assert!(shards.iter().all(|s| s.len() == width));
            let fused = fuse(&shards, data.len()).unwrap();
            prop_assert_eq!(fused.data().as_ref(), data.as_slice());
        }
    }
}
