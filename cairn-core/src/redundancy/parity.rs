//! XOR parity
//!
//! One recovery block, the XOR of all `k` equal-width data shards. It
//! tolerates the loss of exactly one data shard.

use super::{sample_positions, Redundancy};
use crate::block::Block;
use crate::error::{CairnError, Result};
use crate::primitives::xor;
use crate::shard::{fuse, ShardSet};
use bytes::Bytes;
use rand::RngCore;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct XorParity;

impl XorParity {
    /// Compute the parity block for a set of data shards
    pub fn parity(shards: &[Block]) -> Result<Block> {
        let payloads: Vec<&[u8]> = shards.iter().map(|s| s.data().as_ref()).collect();
        Ok(Block::new(xor(&payloads)?))
    }

    /// Recover the ordered data shards from a layout of `k` shards plus parity.
    ///
    /// With every data shard present the parity block is ignored. With
    /// exactly one missing it is rebuilt from the others and the parity
    /// block, then checked against its recorded checksum.
    pub fn recover_shards(&self, shards: ShardSet) -> Result<Vec<Block>> {
        if shards.len() < 2 {
            return Err(CairnError::InvalidConfig(format!(
                "parity layout needs at least 2 blocks, got {}",
                shards.len()
            )));
        }
        let data_count = shards.len() - 1;
        let present = shards.present();
        let missing: Vec<usize> = shards
            .missing()
            .into_iter()
            .filter(|&p| p < data_count)
            .collect();

        let layout = shards.layout().to_vec();
        let mut slots = shards.into_slots();
        let parity = slots.pop().flatten();

        match (missing.as_slice(), parity) {
            ([], _) => {
                debug!("Original shards received, no recovery necessary");
            }
            ([lost], Some(parity)) => {
                let mut parts: Vec<&[u8]> = slots
                    .iter()
                    .flatten()
                    .map(|b| b.data().as_ref())
                    .collect();
                parts.push(parity.data().as_ref());
                let rebuilt = Block::verified(layout[*lost], xor(&parts)?)?;
                debug!(
                    position = lost,
                    checksum = %rebuilt.checksum(),
                    parity = %parity.checksum(),
                    "Recovered shard using parity block"
                );
                slots[*lost] = Some(rebuilt);
            }
            _ => {
                return Err(CairnError::InsufficientRedundancy {
                    available: present,
                    required: data_count,
                });
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

impl Redundancy for XorParity {
    fn name(&self) -> &'static str {
        "parity"
    }

    fn introduce_redundancy(&self, mut shards: Vec<Block>) -> Result<Vec<Block>> {
        if shards.is_empty() {
            return Err(CairnError::InvalidConfig(
                "parity needs at least one shard".to_string(),
            ));
        }
        let parity = Self::parity(&shards)?;
        shards.push(parity);
        Ok(shards)
    }

    fn is_recovery(&self, position: usize, total: usize) -> bool {
        position + 1 == total
    }

    fn minimum_shards(&self, total: usize) -> usize {
        total.saturating_sub(1)
    }

    fn sample(&self, total: usize, rng: &mut dyn RngCore) -> Vec<usize> {
        sample_positions(total, self.minimum_shards(total), rng)
    }

    fn recover(&self, shards: ShardSet, original_len: usize) -> Result<Bytes> {
        let data = self.recover_shards(shards)?;
        Ok(fuse(&data, original_len)?.into_data())
    }
}
