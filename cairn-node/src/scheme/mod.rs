//! Storage schemes
//!
//! A scheme is a closed set of variants, each composed from a sharder and
//! a redundancy codec. The engine drives every variant through the same
//! handshake, stripe, and recovery steps.

pub mod engine;
pub mod transfer;

pub use engine::{File, Placement, SchemeEngine, StoreReceipt};
pub use transfer::Transfer;

use cairn_core::error::{CairnError, Result};
use cairn_core::redundancy::{
    NoRedundancy, Redundancy, ReedSolomonCodec, Replication, XorParity, RS_BLOCK_SIZE,
};
use cairn_core::shard::{FixedSharder, Sharder, Unsharded};
use std::fmt;

/// How a file is spread over peers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScheme {
    /// The whole block on one random peer
    Hosting,
    /// The whole block copied to `n` peers
    NaiveDuplication { n: usize },
    /// `k` shards striped over `n` peers
    VanillaSharding { n: usize, k: usize },
    /// `k` shards plus one XOR parity block striped over `n` peers
    ParitySharding { n: usize, k: usize },
    /// `k` shards, each stored `m` times, striped over `n` peers
    RedundantSharding { n: usize, k: usize, m: usize },
    /// `k` Reed-Solomon shards, any `j` of which decode, striped over `n` peers
    ReedSolomon { n: usize, k: usize, j: usize },
}

/// Sharder and codec a sharded scheme is built from
pub type Pipeline = (Box<dyn Sharder>, Box<dyn Redundancy>);

impl StorageScheme {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hosting => "hosting",
            Self::NaiveDuplication { .. } => "naive",
            Self::VanillaSharding { .. } => "shard",
            Self::ParitySharding { .. } => "parity",
            Self::RedundantSharding { .. } => "shardshard",
            Self::ReedSolomon { .. } => "reedsolomon",
        }
    }

    /// Number of peers a store spreads over
    pub fn peers(&self) -> usize {
        match *self {
            Self::Hosting => 1,
            Self::NaiveDuplication { n }
            | Self::VanillaSharding { n, .. }
            | Self::ParitySharding { n, .. }
            | Self::RedundantSharding { n, .. }
            | Self::ReedSolomon { n, .. } => n,
        }
    }

    /// Whether stores split the block and record a shard layout
    pub fn is_sharded(&self) -> bool {
        !matches!(self, Self::Hosting | Self::NaiveDuplication { .. })
    }

    pub fn validate(&self) -> Result<()> {
        if self.peers() == 0 {
            return Err(CairnError::InvalidConfig(format!(
                "{} needs at least one peer",
                self.name()
            )));
        }

        match *self {
            Self::VanillaSharding { k, .. } | Self::ParitySharding { k, .. } if k == 0 => Err(
                CairnError::InvalidConfig("number of shards must be > 0".to_string()),
            ),
            Self::RedundantSharding { k, m, .. } if k == 0 || m == 0 => Err(
                CairnError::InvalidConfig("shard and copy counts must be > 0".to_string()),
            ),
            Self::ReedSolomon { k, j, .. } => {
                if j == 0 || j >= k {
                    return Err(CairnError::InvalidConfig(format!(
                        "minimum shard count must be in 1..{}, got {}",
                        k, j
                    )));
                }
                if k > RS_BLOCK_SIZE {
                    return Err(CairnError::InvalidConfig(format!(
                        "at most {} Reed-Solomon shards, got {}",
                        RS_BLOCK_SIZE, k
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Sharder and codec for sharded schemes, `None` for whole-block ones
    pub fn pipeline(&self) -> Result<Option<Pipeline>> {
        self.validate()?;

        let pipeline: Pipeline = match *self {
            Self::Hosting | Self::NaiveDuplication { .. } => return Ok(None),
            Self::VanillaSharding { k, .. } => {
                (Box::new(FixedSharder::new(k)), Box::new(NoRedundancy))
            }
            Self::ParitySharding { k, .. } => (Box::new(FixedSharder::new(k)), Box::new(XorParity)),
            Self::RedundantSharding { k, m, .. } => {
                (Box::new(FixedSharder::new(k)), Box::new(Replication::new(m)?))
            }
            Self::ReedSolomon { k, j, .. } => {
                (Box::new(Unsharded), Box::new(ReedSolomonCodec::new(k, j)?))
            }
        };
        Ok(Some(pipeline))
    }
}

impl fmt::Display for StorageScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Hosting => write!(f, "hosting"),
            Self::NaiveDuplication { n } => write!(f, "naive(n={})", n),
            Self::VanillaSharding { n, k } => write!(f, "shard(n={}, k={})", n, k),
            Self::ParitySharding { n, k } => write!(f, "parity(n={}, k={})", n, k),
            Self::RedundantSharding { n, k, m } => {
                write!(f, "shardshard(n={}, k={}, m={})", n, k, m)
            }
            Self::ReedSolomon { n, k, j } => write!(f, "reedsolomon(n={}, k={}, j={})", n, k, j),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::block::Block;

    #[test]
    fn test_whole_block_schemes_have_no_pipeline() {
        assert!(StorageScheme::Hosting.pipeline().unwrap().is_none());
        assert!(StorageScheme::NaiveDuplication { n: 2 }
            .pipeline()
            .unwrap()
            .is_none());
        assert!(!StorageScheme::Hosting.is_sharded());
    }

    #[test]
    fn test_parity_pipeline_layout() {
        let (sharder, codec) = StorageScheme::ParitySharding { n: 4, k: 3 }
            .pipeline()
            .unwrap()
            .unwrap();
        let shards = sharder.shard(&Block::new(&b"abcdefghi"[..])).unwrap();
        let stored = codec.introduce_redundancy(shards).unwrap();

        assert_eq!(stored.len(), 4);
        assert_eq!(codec.minimum_shards(4), 3);
        assert!(codec.is_recovery(3, 4));
    }

    #[test]
    fn test_reed_solomon_pipeline_layout() {
        let (sharder, codec) = StorageScheme::ReedSolomon { n: 5, k: 5, j: 3 }
            .pipeline()
            .unwrap()
            .unwrap();
        let shards = sharder.shard(&Block::new(vec![7u8; 1000])).unwrap();
        assert_eq!(shards.len(), 1);

        let stored = codec.introduce_redundancy(shards).unwrap();
        assert_eq!(stored.len(), 5);
        assert!(!codec.is_recovery(2, 5));
        assert!(codec.is_recovery(3, 5));
    }

    #[test]
    fn test_invalid_schemes() {
        let invalid = [
            StorageScheme::NaiveDuplication { n: 0 },
            StorageScheme::VanillaSharding { n: 3, k: 0 },
            StorageScheme::RedundantSharding { n: 3, k: 3, m: 0 },
            StorageScheme::ReedSolomon { n: 3, k: 3, j: 3 },
            StorageScheme::ReedSolomon { n: 3, k: 3, j: 0 },
            StorageScheme::ReedSolomon { n: 3, k: 256, j: 2 },
        ];
        for scheme in invalid {
            assert!(
                matches!(scheme.pipeline(), Err(CairnError::InvalidConfig(_))),
                "{} should be rejected",
                scheme
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            StorageScheme::ReedSolomon { n: 5, k: 4, j: 2 }.to_string(),
            "reedsolomon(n=5, k=4, j=2)"
        );
        assert_eq!(StorageScheme::ParitySharding { n: 4, k: 3 }.name(), "parity");
    }
}
